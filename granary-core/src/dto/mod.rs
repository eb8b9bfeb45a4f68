//! Data Transfer Objects for inter-service communication
//!
//! DTOs exchanged between workers and the job broker. The broker speaks a
//! frame-oriented JSON protocol; every frame is one of these shapes.

pub mod broker;
