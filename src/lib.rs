//! 3D model generation proxy
//!
//! Accepts text or image generation requests, drives each one through the
//! Tripo AI task API, and relocates the finished model to S3-compatible
//! object storage behind a stable job-status API.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
