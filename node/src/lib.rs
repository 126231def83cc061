// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod api;
pub mod app;
pub mod automation;
pub mod config;
pub mod content;
pub mod critical_section;
pub mod directory;
pub mod errors;
pub mod inflight;
pub mod notify;
pub mod repo;
pub mod server;
pub mod telemetry;
