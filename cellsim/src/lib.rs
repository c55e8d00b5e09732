//! Simulation driver for [`cellsim_core`].
//!
//! Loads a [`Scenario`], turns it into a [`RadioNetwork`] and an
//! [`EventQueue`], and delivers the events in time order with a [`Runner`].
//!
//! [`RadioNetwork`]: cellsim_core::RadioNetwork

pub mod event;
pub mod runner;
pub mod scenario;

pub use self::{
    event::{Event, EventQueue},
    runner::{ErrorPolicy, RunError, RunSummary, Runner, ScheduleError},
    scenario::{Scenario, ScenarioError},
};
