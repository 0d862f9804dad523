pub(crate) mod assignment;
pub(crate) mod auction;
pub(crate) mod broker;
pub(crate) mod cron;
#[cfg(test)]
pub(crate) mod fakes;
pub(crate) mod hub_client;
pub(crate) mod job_store;
pub(crate) mod node_query;
pub(crate) mod recent_events;
pub(crate) mod subscription;
pub(crate) mod topology;
pub(crate) mod worker;

pub type HttpClient = reqwest_middleware::ClientWithMiddleware;
