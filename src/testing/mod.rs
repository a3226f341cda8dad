//! Test doubles for exercising supervision and monitoring without a broker

pub mod mocks;

pub use mocks::MockBroker;
