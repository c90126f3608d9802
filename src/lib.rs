//! # Lockdown Planner - Epidemic forecasting under lockdown policies
//!
//! Fits compartmental disease models (SIR, SEIR variants, ensembles) to observed
//! health data segment by segment along a policy timeline, forecasts health
//! outcomes under proposed future policies, and searches the space of
//! lockdown policies for the Pareto frontier of health and economic loss.
//!
//! ## Core Concepts
//!
//! - **PolicyVector**: dial settings in `[0, 1]` for every economic sector and social measure
//! - **PolicyTimeline**: contiguous policy applications over dates, with open-ended tails
//! - **CompartmentEngine**: fit/predict over one system of compartment ODEs
//! - **ParameterMapper**: nearest-neighbour generalisation of fitted discounts to unseen policies
//! - **PolicySearch**: propose/score loop feeding a `ParetoFrontier`
//!
//! ## Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use lockdown_planner::{Dial, PolicyTimeline, PolicyVector};
//!
//! let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
//! let strict = PolicyVector::from_pairs([(Dial::Curfew, 0.2)]).unwrap();
//! let relaxed = PolicyVector::from_pairs([(Dial::Curfew, 0.8)]).unwrap();
//! let timeline = PolicyTimeline::builder(start)
//!     .then(strict, 30)
//!     .open_ended(relaxed);
//!
//! assert_eq!(timeline.lookup(10).unwrap(), &strict);
//! assert_eq!(timeline.lookup(start + chrono::Duration::days(45)).unwrap(), &relaxed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Inputs
pub mod config;
pub mod error;
pub mod health;
pub mod parameter;
pub mod policy;

// Disease modelling
pub mod mapper;
pub mod model;
pub mod ode;
pub mod optimize;

// Policy search
pub mod economy;
pub mod frontier;
pub mod loss;
pub mod search;

pub use config::PlannerConfig;
pub use economy::{run_economy, EconomicModel, EconomicOutput, SectorGvaModel, SectorOutput};
pub use error::{
    ConfigError, FitError, HealthDataError, MapperError, OdeError, OptimizeError, PlannerError, PlannerResult,
    PredictError, StoreError, TimelineError,
};
pub use frontier::{ParetoFrontier, SearchResult};
pub use health::{HealthData, HealthPoint, PopulationData};
pub use loss::{HealthEconomyObjectives, Loss, LossFunction, WeightedLoss, WellbeingYearsLoss};
pub use mapper::{MapperConfig, MapperStore, ModelKey, ParameterMapper};
pub use model::{
    AuquanSeir, CompartmentDynamics, CompartmentEngine, DiseaseModel, Ensemble, FitReport, FittedModelState,
    HealthModel, Seir, Sir,
};
pub use parameter::{ParamMap, Parameter, ParameterConfig};
pub use policy::{Dial, PolicyApplication, PolicyEnd, PolicyTimeline, PolicyVector};
pub use search::{DialSpace, ExhaustiveSearch, Forecaster, LockdownConfig, PolicySearch, RandomSearch};
