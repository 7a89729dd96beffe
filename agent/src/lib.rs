pub mod config;
pub mod definition;
pub mod deploy;
pub mod engine;
pub mod event;
pub mod session;

pub use config::DeployConfig;
pub use definition::{AgentDefinition, corp_brand_agent, news_agent};
pub use deploy::DeploySpec;
pub use engine::{AgentEngineClient, AgentError, DeployedAgent, EventStream};
pub use event::{ClassifiedItem, Event, Part, PartKind, classify_event, parse_event_content};
pub use session::Session;
