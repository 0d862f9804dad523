pub mod env;
pub mod err;
pub mod init;
pub mod link_header;
pub mod reqwest_helper;
