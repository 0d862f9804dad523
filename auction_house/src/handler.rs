use std::str::FromStr;

use actix_web::dev::Payload;
use actix_web::http::header::{CONTENT_TYPE, LINK, LOCATION};
use actix_web::http::StatusCode;
use actix_web::web::{self, Bytes, Data, Form, Json, Query};
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures::future::{ready, Ready};
use helper::link_header::Link;
use helper::log_err;
use helper::reqwest_helper::API_VERSION_HEADER;
use model::domain::auction::AuctionError;
use model::view::auction::{
    AssignmentList, JobAssignment, PostAuction, PostBid, PostJobResult,
};
use model::view::discovery::DiscoveryRegistration;
use model::view::websub::{HubRequest, VerificationQuery};
use model::view::{check_version_header, Envelope, Versioned};
use model::AuctionId;
use serde::{Deserialize, Serialize};

use crate::controller::{self, ControllerError};
use crate::service::auction::{self, AuctionEngine};
use crate::service::bidding::BiddingClient;
use crate::service::discovery::DiscoveryMaintainer;
use crate::service::hub::EmbeddedHub;
use crate::service::notification::NotificationBridge;

/// Header naming the ring of this node on `GET /auctions/`.
pub const APPLICATION_AREA_HEADER: &str = "X-Application-Area";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ControllerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ControllerError::InvalidRequest(_)
            | ControllerError::Version(_)
            | ControllerError::Bidding(_)
            | ControllerError::Discovery(_)
            | ControllerError::Hub(_)
            | ControllerError::Notification(_) => StatusCode::BAD_REQUEST,
            ControllerError::UnknownAuction(_) => StatusCode::NOT_FOUND,
            ControllerError::Auction(auction::Error::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ControllerError::Auction(auction::Error::Auction(err)) => {
                match err {
                    AuctionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    AuctionError::Closed(_)
                    | AuctionError::NotAwarded { .. } => StatusCode::CONFLICT,
                    AuctionError::NotWinner { .. } => StatusCode::FORBIDDEN,
                }
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(Envelope::new(ErrorBody { error: self.to_string() }))
    }
}

/// Rejects the request when `X-API-Version` names another version. A
/// missing header is accepted.
#[derive(Debug)]
pub struct VersionChecked;

impl FromRequest for VersionChecked {
    type Error = ControllerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let header = req
            .headers()
            .get(API_VERSION_HEADER)
            .map(|value| value.to_str().unwrap_or("<not ascii>"));
        ready(
            check_version_header(header)
                .map(|()| VersionChecked)
                .map_err(ControllerError::from),
        )
    }
}

fn parse_auction_id(raw: &str) -> Result<AuctionId, ControllerError> {
    AuctionId::from_str(raw.trim())
        .map_err(|_| ControllerError::UnknownAuction(raw.to_string()))
}

/// Open a new auction.
pub async fn post_auction(
    _: VersionChecked,
    payload: Json<Versioned<PostAuction>>,
    engine: Data<AuctionEngine>,
) -> Result<HttpResponse, ControllerError> {
    let res = controller::auction::open_auction(payload.0, &engine).await;
    log_err!(res, warn);
    let auction = res?;
    Ok(HttpResponse::Created()
        .insert_header((LOCATION, auction.auction_uri.clone()))
        .json(Envelope::new(auction)))
}

#[derive(Debug, Deserialize)]
pub struct ListAuctionsParams {
    #[serde(default)]
    all: bool,
}

/// Open auctions, with the links a subscriber needs to find the hub.
pub async fn get_auctions(
    _: VersionChecked,
    params: Query<ListAuctionsParams>,
    engine: Data<AuctionEngine>,
    bridge: Data<NotificationBridge>,
    discovery: Data<DiscoveryMaintainer>,
) -> Result<HttpResponse, ControllerError> {
    let list = controller::auction::list_auctions(params.all, &engine).await;
    let ring_type = discovery.ring_type().to_string();

    let mut response = HttpResponse::Ok();
    response
        .append_header((
            LINK,
            Link::new(bridge.hub_uri(), "hub").to_header_value(),
        ))
        .append_header((
            LINK,
            Link::new(bridge.topic_uri(), "self").to_header_value(),
        ))
        .insert_header((APPLICATION_AREA_HEADER, ring_type.clone()));
    if let Some(successor) = discovery.ring_successor().await {
        let link = Link::new(successor.as_str(), "relation")
            .with_param("type", &ring_type);
        response.append_header((LINK, link.to_header_value()));
    }
    Ok(response.json(Envelope::new(list)))
}

pub async fn get_auction(
    _: VersionChecked,
    id: web::Path<String>,
    engine: Data<AuctionEngine>,
) -> Result<HttpResponse, ControllerError> {
    let id = parse_auction_id(&id)?;
    let res = controller::auction::get_auction(&id, &engine).await;
    log_err!(res, warn);
    Ok(HttpResponse::Ok().json(Envelope::new(res?)))
}

pub async fn post_bid(
    _: VersionChecked,
    id: web::Path<String>,
    payload: Json<Versioned<PostBid>>,
    engine: Data<AuctionEngine>,
) -> Result<HttpResponse, ControllerError> {
    let id = parse_auction_id(&id)?;
    let res = controller::auction::submit_bid(&id, payload.0, &engine).await;
    log_err!(res, warn);
    res?;
    Ok(HttpResponse::Accepted().finish())
}

/// Result of the job, sent by the winner of the auction.
pub async fn post_job_result(
    _: VersionChecked,
    id: web::Path<String>,
    payload: Json<Versioned<PostJobResult>>,
    engine: Data<AuctionEngine>,
) -> Result<HttpResponse, ControllerError> {
    let id = parse_auction_id(&id)?;
    let res = controller::auction::report_result(&id, payload.0, &engine).await;
    log_err!(res, warn);
    Ok(HttpResponse::Ok().json(Envelope::new(res?)))
}

pub async fn get_discovery(
    _: VersionChecked,
    discovery: Data<DiscoveryMaintainer>,
) -> HttpResponse {
    let hosts = controller::discovery::get_hosts(&discovery).await;
    HttpResponse::Ok().json(Envelope::new(hosts))
}

pub async fn post_discovery(
    _: VersionChecked,
    payload: Json<Versioned<DiscoveryRegistration>>,
    discovery: Data<DiscoveryMaintainer>,
) -> Result<HttpResponse, ControllerError> {
    let res = controller::discovery::register(payload.0, &discovery).await;
    log_err!(res, warn);
    Ok(HttpResponse::Created().json(Envelope::new(res?)))
}

/// Intent verification sent by a hub this node subscribed to.
pub async fn get_websub(
    query: Query<VerificationQuery>,
    bridge: Data<NotificationBridge>,
) -> HttpResponse {
    match controller::websub::verify(&query, &bridge) {
        Some(challenge) => HttpResponse::Ok()
            .insert_header((CONTENT_TYPE, "text/plain"))
            .body(challenge),
        None => HttpResponse::NotFound().finish(),
    }
}

/// Content distributed by a hub.
pub async fn post_websub(
    body: Bytes,
    bridge: Data<NotificationBridge>,
) -> Result<HttpResponse, ControllerError> {
    let res = controller::websub::receive(&body, &bridge).await;
    log_err!(res, warn);
    res?;
    Ok(HttpResponse::Ok().finish())
}

pub async fn post_hub(
    request: Form<HubRequest>,
    hub: Data<EmbeddedHub>,
) -> Result<HttpResponse, ControllerError> {
    let res = controller::websub::hub_request(request.into_inner(), &hub);
    log_err!(res, warn);
    res?;
    Ok(HttpResponse::Accepted().finish())
}

/// Job of an auction this node won on another auction house.
pub async fn post_bidder_job(
    _: VersionChecked,
    id: web::Path<String>,
    payload: Json<Versioned<JobAssignment>>,
    bidding: Data<BiddingClient>,
) -> Result<HttpResponse, ControllerError> {
    let res = controller::bidding::accept_assignment(&id, payload.0, &bidding);
    log_err!(res, warn);
    res?;
    Ok(HttpResponse::Accepted().finish())
}

pub async fn get_bidder_jobs(
    _: VersionChecked,
    bidding: Data<BiddingClient>,
) -> HttpResponse {
    let assignments = controller::bidding::list_assignments(&bidding);
    HttpResponse::Ok().json(Envelope::new(AssignmentList { assignments }))
}

pub async fn health() -> HttpResponse { HttpResponse::Ok().finish() }

/// Every route of the auction house.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(["/auctions", "/auctions/"])
            .route(web::get().to(get_auctions))
            .route(web::post().to(post_auction)),
    )
    .route("/auctions/{id}", web::get().to(get_auction))
    .route("/auctions/{id}/bid", web::post().to(post_bid))
    .route("/auctions/{id}/job", web::post().to(post_job_result))
    .route("/discovery", web::get().to(get_discovery))
    .route("/discovery", web::post().to(post_discovery))
    .route("/websub", web::get().to(get_websub))
    .route("/websub", web::post().to(post_websub))
    .route("/hub", web::post().to(post_hub))
    .route("/bidders/jobs", web::get().to(get_bidder_jobs))
    .route("/bidders/{id}/job", web::post().to(post_bidder_job))
    .route("/health", web::get().to(health));
}
