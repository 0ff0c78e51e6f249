#![doc = include_str!("../README.md")]

mod packetutil;
pub use packetutil::OOB_MARKER;

mod error;
pub use error::{CoreError, ErrorKind};

mod config;
pub use config::ClientConfig;

mod server_address;
pub use server_address::{ServerAddress, DEFAULT_PORT};

mod resolve_address;
pub use resolve_address::{
    resolve_hostname, DnsLookup, HostResolver, HttpEcho, NoEcho, PublicIpLookup, ResolvedAddress,
    SystemDns,
};

mod status;
pub use status::{
    parse_status_response, strip_color_codes, PlayerEntry, ServerInfo, StatusQueryClient,
};

mod rcon;
pub use rcon::{sanitize_command, RconClient, RconResult, AUTH_REJECTION_MARKERS};

mod server_data;
pub use server_data::{process_server_data, Mode, OperationOutcome, ServerDataFacade};
