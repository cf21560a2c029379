pub mod alerts;
pub mod config;
pub mod entities;
pub mod notifier;
pub mod reminder;
pub mod scheduler;
pub mod task;
pub mod web;
