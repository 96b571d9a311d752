use thiserror::Error;

/// Errors that can occur in the uplink failover system
#[derive(Error, Debug)]
pub enum FailoverError {
    /// Interface name did not match any entry in the OS interface list
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// Command execution failed
    #[error("Failed to execute command: {0}")]
    CommandExecution(String),

    /// Route metric could not be applied by name or by index
    #[error("Route metric update failed: {0}")]
    RouteModificationFailed(String),

    /// Interface could not be brought up
    #[error("Failed to enable interface: {0}")]
    EnableFailed(String),

    /// No IPv4 address is bound to the interface
    #[error("No address bound to interface: {0}")]
    AddressNotFound(String),

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operating system is not supported
    #[error("Unsupported operating system")]
    UnsupportedOS,

    /// Insufficient permissions
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    /// IO error
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

/// Shorthand result type for failover operations
pub type FailoverResult<T> = Result<T, FailoverError>;
