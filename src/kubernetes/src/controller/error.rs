use stahld_trace::error::TraceableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("std::io::Error")]
    StdIo(#[from] std::io::Error),

    #[error("config error")]
    Config(#[from] ConfigError),

    #[error("SerializationError: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    Kube(#[source] kube::Error),

    #[error("Inventory Error: {0}")]
    Inventory(#[source] stahld_inventory::error::InventoryError),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("Kube Library Error: {0}")]
    KubeLibrary(#[source] crate::error::Error),

    #[error("IP {0} has no network")]
    MissingNetwork(String),

    #[error("ASN not found")]
    AsnNotFound,

    #[error("Invalid ASN value")]
    InvalidAsnValue,

    #[error("Address not found")]
    AddressNotFound,

    #[error("Invalid Address")]
    InvalidAddress,

    #[error("FailedToGetData: {0}")]
    FailedToGetData(String),

    #[error("IP {0} is already owned by a machine")]
    IpOwnedByMachine(String),

    #[error("IP {0} is reserved for egress")]
    IpReservedForEgress(String),

    #[error("Conflict retry budget exceeded")]
    TooManyConflicts,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load")]
    FailedToLoad,
    #[error("invalid argument")]
    InvalidArgument,
}

impl TraceableError for &Error {
    fn metric_label(&self) -> String {
        format!("{self:?}").to_lowercase()
    }
}

impl TraceableError for Error {
    fn metric_label(&self) -> String {
        format!("{self:?}").to_lowercase()
    }
}
