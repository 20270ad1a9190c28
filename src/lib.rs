//! # Toolver Core Library
//!
//! This crate contains the core logic of `toolver`, a version manager for language runtimes
//! and build tools (Java, Node, Go, Rust, Python, Ruby, .NET, Scala, Maven, Gradle, ...).
//!
//! `toolver` resolves loose version requests such as `20` or `2.13.x` against a tool's
//! published versions, downloads and verifies the artifact, unpacks it into a per-user
//! install root and switches the active version through a `current` alias.
//!
//! This library is built for the `toolver` CLI, but the pieces can be reused on their own.
//!
//! ## Modules Overview
//! - [`matcher`] – Version expressions, distribution aliases and resolution
//! - [`fetch`] – Resumable, verified downloads with a retry policy
//! - [`descriptor`] – Data-driven tool definitions: listings, URL templates, checksums
//! - [`catalog`] – Built-in and user-supplied tool definitions
//! - [`installer`] – Installing and uninstalling versions
//! - [`activate`] – Switching the active version and persisting its environment
//! - [`detect`] – Finding versions declared by project files
//! - [`store`] – On-disk layout of the install root
//! - [`environment`] – Environment values and shell rendering
//! - [`persist`] – Durable user environment writes
//! - [`doctor`] – Health checks over the install root and shell integration
//! - [`config`] – User settings
//! - [`util`] – Shared helpers (platform tokens, version ordering, formatting)

pub mod activate;
pub mod archive;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod detect;
pub mod doctor;
pub mod environment;
pub mod error;
pub mod fetch;
pub mod installer;
pub mod link;
pub mod matcher;
pub mod persist;
pub mod progress;
pub mod store;
pub mod util;

pub use activate::{Activation, Activator, Scope};
pub use catalog::Catalog;
pub use config::Settings;
pub use descriptor::{ArtifactKind, Distribution, ToolDescriptor};
pub use detect::{DetectedVersion, Detector};
pub use doctor::{Doctor, Finding, Severity};
pub use environment::{Environment, Shell};
pub use error::{Error, Result};
pub use fetch::{FetchResult, Fetcher, RetryPolicy};
pub use installer::{Installed, Installer};
pub use matcher::{DistributionAliases, ResolvedVersion, VersionExpression};
pub use persist::{EnvPersister, PersistReport, PersistStrategy};
pub use progress::{BarReporter, NoProgress, ProgressReporter, ProgressSnapshot};
pub use store::Store;
