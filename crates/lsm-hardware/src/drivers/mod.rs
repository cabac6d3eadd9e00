//! Driver implementations bundled with the workspace.
//!
//! Physical drivers are supplied by the integrating application through
//! [`DeviceBackend`](crate::backend::DeviceBackend). Only the simulated set lives here.

pub mod mock;
