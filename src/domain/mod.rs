//! Domain logic for the Splunk tool surface
//!
//! Provides the tool catalog, dispatch, and the service health chart transform.

pub mod chart;
pub mod tools;
