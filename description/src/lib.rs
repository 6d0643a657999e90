//! Parsing of UPnP description documents.
//!
//! A control point learns what a device can do from two kinds of documents:
//! the device description (which services exist and where their endpoints
//! live) and one service description (SCPD) per service (which actions exist
//! and what arguments they take). This crate turns both into plain data,
//! validating the fields a control point cannot work without.
//!
//! Lists in these documents are always exposed as `Vec`s. A description that
//! holds a single `<service>` or `<action>` produces a one-element list, never
//! a special case.

mod device;
mod error;
mod scpd;

pub use device::{DeviceDescription, ServiceEndpoints};
pub use error::{DescriptionError, Result};
pub use scpd::{ActionSpec, ArgumentSpec, Direction, ServiceDescription, StateVariable};
