#[macro_use]
extern crate tracing;

use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{middleware, App, HttpServer};
use anyhow::Context;
use helper::reqwest_helper::API_VERSION_HEADER;
use model::domain::peer::PeerNode;
use model::API_VERSION;
#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;
use reqwest_middleware::ClientBuilder;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::repository::broker::{run_event_loop, MessageBroker, MqttBroker};
use crate::repository::node_query::NodeQuery;
use crate::repository::worker::Worker;
use crate::service::discovery::LivenessCheck;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod config;
mod controller;
mod handler;
mod repository;
mod service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = helper::init::init_subscriber("auction_house", "info")?;

    debug!("Tracing initialized.");

    let config = Config::from_env()?;
    let house = config.house.clone();
    info!(
        "Auction house {} on the {} ring, hub {}",
        house,
        config.ring_type,
        config.effective_hub_uri()
    );

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    let http_client = Arc::new(
        ClientBuilder::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("Cannot build the HTTP client")?,
        )
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build(),
    );

    // Repositories
    let node_query: Arc<dyn NodeQuery> = Arc::new(
        repository::node_query::NodeQueryRESTImpl::new(http_client.clone()),
    );
    let hub_client = Arc::new(
        repository::hub_client::HubClientRESTImpl::new(http_client.clone()),
    );
    let job_store = Arc::new(repository::job_store::JobStoreRESTImpl::new(
        http_client.clone(),
    ));
    let worker = config.worker_uri.clone().map(|uri| {
        Arc::new(repository::worker::WorkerRESTImpl::new(
            http_client.clone(),
            uri,
        )) as Arc<dyn Worker>
    });
    let topology = Arc::new(repository::topology::TopologyStore::new(
        PeerNode::new(house.clone(), config.ring_type),
    ));
    let cron = Arc::new(repository::cron::Cron::new());

    let (events_tx, events_rx) = mpsc::channel(256);

    let broker = match &config.mqtt {
        Some(settings) => {
            let (broker, event_loop) = MqttBroker::new(settings);
            tokio::spawn(run_event_loop(
                event_loop,
                broker.client(),
                settings.topic.clone(),
                events_tx.clone(),
            ));
            Some(Arc::new(broker) as Arc<dyn MessageBroker>)
        }
        None => {
            info!("MQTT transport disabled");
            None
        }
    };

    // Services
    let bridge = Arc::new(service::notification::NotificationBridge::new(
        house.clone(),
        service::notification::BridgeSettings {
            hub_uri:             config.effective_hub_uri(),
            retry_initial:       std::time::Duration::from_millis(500),
            retry_max_elapsed:   std::time::Duration::from_secs(60),
            retry_pending_after: config.discovery_refresh,
            renew_after:         std::time::Duration::from_secs(3600),
        },
        hub_client.clone(),
        broker,
        node_query.clone(),
        topology.clone(),
        Arc::new(repository::subscription::SubscriptionStore::new()),
        events_tx,
    ));
    let hub = Arc::new(service::hub::EmbeddedHub::new(
        house.join("hub"),
        hub_client,
        Arc::new(repository::subscription::SubscriptionStore::new()),
    ));
    let engine = Arc::new(service::auction::AuctionEngine::new(
        house.clone(),
        Arc::new(repository::auction::AuctionStore::new()),
        Arc::new(service::notification::BridgePublisher::new(bridge.clone())),
        node_query.clone(),
        job_store,
        cron.clone(),
        service::auction::EngineSettings {
            winner_policy:        config.winner_policy,
            award_timeout:        config.award_timeout,
            award_timeout_policy: config.award_timeout_policy,
        },
    ));
    let bidding = Arc::new(service::bidding::BiddingClient::new(
        house.clone(),
        service::bidding::BiddingSettings {
            supported_job_types: config.supported_job_types.clone(),
            bidder_name:         config.bidder_name.clone().into_inner(),
            bid_value:           config.bid_value.into_inner(),
            retry_initial:       std::time::Duration::from_millis(500),
            retry_max_elapsed:   std::time::Duration::from_secs(60),
        },
        node_query.clone(),
        worker,
        Arc::new(repository::assignment::AssignmentStore::new()),
    ));
    let liveness: Arc<dyn LivenessCheck> = if config.liveness_probe {
        Arc::new(service::discovery::HttpProbe::new(node_query.clone()))
    } else {
        Arc::new(service::discovery::AssumeAlive)
    };
    let discovery = Arc::new(service::discovery::DiscoveryMaintainer::new(
        topology,
        node_query,
        liveness,
        config.entry_point.clone(),
        service::discovery::DiscoverySettings {
            max_hops:      config.crawl_max_hops.into_inner(),
            crawl_timeout: config.crawl_timeout,
        },
    ));

    let dispatcher = service::notification::Dispatcher::new(
        house.clone(),
        config.dedup_capacity.into_inner(),
        bidding.clone(),
    );
    tokio::spawn(dispatcher.run(events_rx));

    // Peers may not be up yet, so the bootstrap runs in the background
    {
        let discovery = discovery.clone();
        let bridge = bridge.clone();
        tokio::spawn(async move {
            discovery.bootstrap().await;
            bridge.subscribe_to_peers().await;
        });
    }
    {
        let discovery = discovery.clone();
        let bridge = bridge.clone();
        cron.add_periodic(config.discovery_refresh, move || {
            let discovery = discovery.clone();
            let bridge = bridge.clone();
            Box::pin(async move {
                discovery.refresh().await;
                bridge.subscribe_to_peers().await;
            })
        });
    }
    if let Some(period) = config.poll_interval {
        let bridge = bridge.clone();
        cron.add_periodic(period, move || {
            let bridge = bridge.clone();
            Box::pin(async move {
                bridge.poll_peers().await;
            })
        });
    }

    let port = config.server_port.into_inner();
    info!("Starting HTTP server on 0.0.0.0:{}", port);

    let engine = Data::from(engine);
    let discovery = Data::from(discovery);
    let bridge = Data::from(bridge);
    let hub = Data::from(hub);
    let bidding = Data::from(bidding);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add((API_VERSION_HEADER, API_VERSION.to_string())),
            )
            .app_data(Data::clone(&engine))
            .app_data(Data::clone(&discovery))
            .app_data(Data::clone(&bridge))
            .app_data(Data::clone(&hub))
            .app_data(Data::clone(&bidding))
            .configure(handler::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
