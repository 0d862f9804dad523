pub mod assignment;
pub mod auction;
pub mod peer;
pub mod subscription;
