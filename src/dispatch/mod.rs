pub mod command;
pub mod dispatcher;

pub use command::{
    BatteryAck, BatteryMode, BatteryStatusUpdate, CommandBody, CommandResponse, CommandResult,
    OptimizationCommand,
};
pub use dispatcher::{CommandDispatcher, derive_grid_command};
