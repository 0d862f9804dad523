pub(crate) mod auction;
pub(crate) mod bidding;
pub(crate) mod discovery;
pub(crate) mod hub;
pub(crate) mod notification;
