pub mod launch;
pub mod refresh;
pub mod request;
