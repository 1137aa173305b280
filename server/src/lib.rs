pub mod capture;
pub mod preview;
pub mod routes;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod stream;
