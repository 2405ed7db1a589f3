pub mod agents;
pub mod context;
pub mod decision_engine;
pub mod memory;
pub mod position_sizer;
pub mod scheduler;
