//! Neural network model definitions

pub mod cnn;

pub use cnn::{CropDiseaseNet, CropDiseaseNetConfig};
