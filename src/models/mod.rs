pub mod simulator_model;
