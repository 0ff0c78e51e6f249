//! Single entry point for callers that only know an address and what they want done.

use log::{debug, warn};
use serde::Serialize;

use crate::{
    config::ClientConfig,
    error::{CoreError, ErrorKind},
    rcon::{RconClient, RconResult},
    resolve_address::{DnsLookup, HostResolver, PublicIpLookup},
    server_address::ServerAddress,
    status::{PlayerEntry, ServerInfo, StatusQueryClient},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Query,
    Rcon,
}

/// What every call through [`ServerDataFacade`] returns, whichever client ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Status {
        server_info: ServerInfo,
        players: Vec<PlayerEntry>,
    },
    Rcon(RconResult),
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
enum Envelope<'a> {
    Status {
        success: bool,
        server_info: &'a ServerInfo,
        players: &'a [PlayerEntry],
    },
    Rcon {
        success: bool,
        response: &'a str,
    },
    Failure {
        success: bool,
        error_kind: ErrorKind,
        error: &'a str,
    },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, OperationOutcome::Failure { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationOutcome::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Render the `{"success": ...}` envelope the admin layer consumes.
    pub fn to_json(&self) -> String {
        let envelope = match self {
            OperationOutcome::Status {
                server_info,
                players,
            } => Envelope::Status {
                success: true,
                server_info,
                players,
            },
            OperationOutcome::Rcon(result) => Envelope::Rcon {
                success: true,
                response: &result.raw_response_text,
            },
            OperationOutcome::Failure { kind, message } => Envelope::Failure {
                success: false,
                error_kind: *kind,
                error: message,
            },
        };

        serde_json::to_string(&envelope).unwrap_or_else(|err| {
            serde_json::json!({
                "success": false,
                "error_kind": ErrorKind::Protocol,
                "error": err.to_string(),
            })
            .to_string()
        })
    }
}

impl From<CoreError> for OperationOutcome {
    fn from(err: CoreError) -> Self {
        OperationOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Result<(ServerInfo, Vec<PlayerEntry>), CoreError>> for OperationOutcome {
    fn from(result: Result<(ServerInfo, Vec<PlayerEntry>), CoreError>) -> Self {
        match result {
            Ok((server_info, players)) => OperationOutcome::Status {
                server_info,
                players,
            },
            Err(err) => err.into(),
        }
    }
}

impl From<Result<RconResult, CoreError>> for OperationOutcome {
    fn from(result: Result<RconResult, CoreError>) -> Self {
        match result {
            Ok(result) => OperationOutcome::Rcon(result),
            Err(err) => err.into(),
        }
    }
}

/// Resolves, then hands off to the status or RCON client. No state survives a call.
#[derive(Debug, Clone)]
pub struct ServerDataFacade<D = crate::SystemDns, P = crate::HttpEcho> {
    resolver: HostResolver<D, P>,
    status: StatusQueryClient,
    rcon: RconClient,
}

impl ServerDataFacade {
    pub fn new(config: ClientConfig) -> Self {
        ServerDataFacade {
            resolver: HostResolver::new(&config),
            status: StatusQueryClient::new(config.clone()),
            rcon: RconClient::new(config),
        }
    }
}

impl Default for ServerDataFacade {
    fn default() -> Self {
        ServerDataFacade::new(ClientConfig::default())
    }
}

impl<D: DnsLookup, P: PublicIpLookup> ServerDataFacade<D, P> {
    pub fn with_resolver(resolver: HostResolver<D, P>, config: ClientConfig) -> Self {
        ServerDataFacade {
            resolver,
            status: StatusQueryClient::new(config.clone()),
            rcon: RconClient::new(config),
        }
    }

    pub async fn process(
        &self,
        address: &ServerAddress,
        mode: Mode,
        password: Option<&str>,
        command: Option<&str>,
    ) -> OperationOutcome {
        let outcome = self.try_process(address, mode, password, command).await;
        if let OperationOutcome::Failure { kind, message } = &outcome {
            warn!("{:?} on {} failed ({:?}): {}", mode, address, kind, message);
        }
        outcome
    }

    async fn try_process(
        &self,
        address: &ServerAddress,
        mode: Mode,
        password: Option<&str>,
        command: Option<&str>,
    ) -> OperationOutcome {
        if let Err(err) = address.validate() {
            return err.into();
        }

        // checked up front so a missing argument never costs a DNS lookup
        let rcon_args = match mode {
            Mode::Query => None,
            Mode::Rcon => match rcon_arguments(password, command) {
                Ok(args) => Some(args),
                Err(err) => return err.into(),
            },
        };

        let resolved = match self.resolver.resolve(&address.host).await {
            Ok(resolved) => resolved,
            Err(err) => return err.into(),
        };
        let ip = resolved.ip.to_string();
        debug!("{} resolved to {}", address, ip);

        match rcon_args {
            None => self.status.query(&ip, address.port).await.into(),
            Some((password, command)) => self
                .rcon
                .execute(&ip, address.port, password, command)
                .await
                .into(),
        }
    }

    /// Check that a server answers RCON with the given password and report its status.
    ///
    /// Sends `status` over RCON first; a rejection marker in the reply fails
    /// with `InvalidInput` carrying the server's text. Then runs a status query.
    pub async fn verify_server(
        &self,
        address: &ServerAddress,
        password: &str,
    ) -> Result<(ServerInfo, Vec<PlayerEntry>), CoreError> {
        address.validate()?;
        rcon_arguments(Some(password), Some("status"))?;

        let ip = self.resolver.resolve(&address.host).await?.ip.to_string();

        let reply = self.rcon.execute(&ip, address.port, password, "status").await?;
        if reply.is_auth_rejected() {
            return Err(CoreError::InvalidInput(format!(
                "Invalid RCON password: {}",
                reply.raw_response_text.trim()
            )));
        }

        self.status.query(&ip, address.port).await
    }
}

fn rcon_arguments<'a>(
    password: Option<&'a str>,
    command: Option<&'a str>,
) -> Result<(&'a str, &'a str), CoreError> {
    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| CoreError::InvalidInput("RCON password required".into()))?;
    let command = command
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CoreError::InvalidInput("RCON command required".into()))?;
    Ok((password, command))
}

/// [`ServerDataFacade::process`] with default configuration.
pub async fn process_server_data(
    address: &ServerAddress,
    mode: Mode,
    password: Option<&str>,
    command: Option<&str>,
) -> OperationOutcome {
    ServerDataFacade::default()
        .process(address, mode, password, command)
        .await
}
