//! gradle-bridge - An out-of-process bridge between an IDE and a JVM build tool
//!
//! This crate provides functionality to:
//! - Drive a long-lived build tool worker per project root over a JSON-lines protocol
//! - Run many concurrent, independently cancellable operations and stream their frames
//! - Resolve raw build-target metadata into one de-duplicated project model
pub mod cancellation;
pub mod config;
pub mod error;
pub mod executor;
pub mod launcher;
pub mod output;
pub mod protocol;
pub mod resolver;
pub mod state;

// Re-export commonly used types and traits
pub use error::{Error, ErrorKind, Result};

// Re-export main API components
pub use cancellation::{CancellationRegistry, OperationKind};
pub use config::{BridgeConfig, ConfigLoader};
pub use executor::Bridge;
pub use launcher::{Connection, ConnectionFactory, Launcher};
pub use output::{MemoryReply, OperationSink, OutputMultiplexer, ReplyChannel};
pub use protocol::{Envelope, Frame, InboundRequest, Request};
pub use resolver::{ProjectModel, Resolver};
