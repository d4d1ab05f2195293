pub mod client;
pub mod form;
pub mod routes;

pub use client::{classify, HttpRemoteClient, RemoteConfig, RemoteError, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};
pub use form::flatten;
pub use routes::{route, Method, Route};
