pub mod app;
pub mod jobs;
