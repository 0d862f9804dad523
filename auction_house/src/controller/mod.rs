use model::view::UnsupportedVersion;

#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("No auction is known as {0:?}")]
    UnknownAuction(String),
    #[error(transparent)]
    Version(#[from] UnsupportedVersion),
    #[error(transparent)]
    Auction(#[from] crate::service::auction::Error),
    #[error(transparent)]
    Bidding(#[from] crate::service::bidding::Error),
    #[error(transparent)]
    Discovery(#[from] crate::service::discovery::Error),
    #[error(transparent)]
    Hub(#[from] crate::service::hub::Error),
    #[error(transparent)]
    Notification(#[from] crate::service::notification::Error),
}

pub(crate) mod auction;
pub(crate) mod bidding;
pub(crate) mod discovery;
pub(crate) mod websub;
