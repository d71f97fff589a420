//! Built-in task handlers.

pub mod maintenance;
pub mod thumbnail;

pub use maintenance::{
    MAINTENANCE_TASK, MaintenanceHandler, MaintenanceJobs, MaintenanceReport, MaintenanceRequest,
    MaintenanceStep,
};
pub use thumbnail::ThumbnailHandler;
