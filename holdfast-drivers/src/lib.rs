//! Driver layer for retry-hardened browser automation.
//!
//! This crate wraps a `fantoccini` WebDriver client so that every element
//! interaction polls until it succeeds or a fixed timeout elapses, and adds
//! the utilities needed to get a driver executable running in the first
//! place.
//!
//! - [`session::Browser`]: WebDriver client wrapper with implicit retries
//! - [`page::Page`]: URL + expected-title holder with load-time verification
//! - [`retry`]: the poll-until-success-or-timeout loop itself
//! - [`service`]: driver-binary install, stale-process cleanup, launch/attach
pub mod page;
pub mod retry;
pub mod service;
pub mod session;

pub use fantoccini::Locator;
pub use holdfast_common::{BrowserKind, UserAction};
pub use page::Page;
pub use retry::RetryPolicy;
pub use service::DriverService;
pub use session::Browser;
