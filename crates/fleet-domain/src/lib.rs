// fleet-domain library entry point
pub mod error;
pub mod identity;
pub mod parser;
pub mod report;
pub use error::{DomainError, ParseError};
pub use identity::{ContentHash, Fqdn};
pub use parser::{PuppetYamlParser, ReportParser};
pub use report::{HostState, Report, ReportState};
