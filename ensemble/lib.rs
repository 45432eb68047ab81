#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod combine;
pub mod data;
pub mod dataset;
pub mod query;
pub mod weights;
