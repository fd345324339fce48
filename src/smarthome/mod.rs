//! The smart home provider API: discovery, state queries and actions for the
//! receiver, wrapped in the platform's response envelope.

mod gateway;
mod handlers;
mod types;

pub use gateway::{CommandGateway, DeviceProfile};
pub use handlers::{
    SmartHomeState, action_handler, devices_handler, health_handler, query_handler,
    unlink_handler,
};
