pub mod connection;
pub mod model_system;
pub mod scheduler;

pub use connection::{same_connection, ConnectionFactory, ProviderConnection, SharedConnection};
pub use model_system::{ModelSystem, ModelSystemStatus, SystemManager};
pub use scheduler::TaskSchedulingService;
