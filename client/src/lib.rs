//! Client core for the Clearmark media-download and watermark-removal
//! frontend.
//!
//! Two independent session controllers, no shared runtime state:
//! - [`tracker`]: submit a download request and drive a fixed-cadence
//!   polling loop (or the streaming variant in [`stream`]) against the
//!   backend's progress contract, rendering every snapshot through a
//!   [`tracker::ProgressView`].
//! - [`regions`]: record rectangular selections over a video frame in
//!   video-pixel coordinates and keep the serialized `regions` form field
//!   in sync.
//!
//! The backend itself is an external collaborator reached only through the
//! HTTP/JSON endpoints wrapped by [`api::BackendClient`].

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod regions;
pub mod stream;
pub mod tracker;

pub use api::{BackendClient, DownloadStarted};
pub use config::ClientConfig;
pub use errors::{ClientError, ClientResult};
pub use models::{DownloadRequest, MediaType, ProgressSnapshot, SnapshotStatus, VideoInfo};
pub use regions::{Region, RegionSelector, RegionView, Viewport};
pub use tracker::{ProgressView, Tracker, TrackerPhase};
