use std::time::Duration;

use anyhow::Context;

/// Static, injectable configuration for one process in the roster.
///
/// Every field is read once at startup from the environment; nothing here
/// is reloaded or renegotiated for the process lifetime (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub process_id: u32,
    pub total_processes: u32,
    pub peer_port: u16,
    pub peers: Vec<String>,
    pub delay_hook: Option<DelayHook>,
}

/// The ACK-delay test hook: forces `delay_process_id` to sleep
/// `delay_seconds` before emitting its ACK for `message_id` (spec §4.2).
#[derive(Debug, Clone)]
pub struct DelayHook {
    pub message_id: String,
    pub process_id: u32,
    pub delay: Duration,
}

const FALLBACK_PROCESS_ID: u32 = 99;

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let process_id = process_id_from_env().unwrap_or_else(|err| {
            tracing::error!("falling back to process id {FALLBACK_PROCESS_ID}: {err:#}");
            FALLBACK_PROCESS_ID
        });
        let total_processes = env_or("TOTAL_PROCESSES", 3u32)?;
        let peer_port = env_or("PEER_PORT", 8080u16)?;
        let peers = peer_roster(total_processes, peer_port)?;
        let delay_hook = delay_hook_from_env()?;
        let config = Self {
            process_id,
            total_processes,
            peer_port,
            peers,
            delay_hook,
        };
        anyhow::ensure!(
            (config.process_id as usize) < config.peers.len() || config.peers.is_empty(),
            "process_id {} out of range for {} peers",
            config.process_id,
            config.peers.len()
        );
        Ok(config)
    }
}

fn process_id_from_env() -> anyhow::Result<u32> {
    if let Ok(raw) = std::env::var("PROCESS_ID") {
        return raw
            .trim()
            .parse()
            .with_context(|| format!("PROCESS_ID {raw:?} is not a valid process id"));
    }
    let pod_name = std::env::var("POD_NAME").context("neither PROCESS_ID nor POD_NAME set")?;
    let suffix = pod_name
        .rsplit('-')
        .next()
        .context("POD_NAME has no '-' separated suffix")?;
    suffix
        .parse()
        .with_context(|| format!("POD_NAME {pod_name:?} has non-numeric suffix {suffix:?}"))
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("{key} {raw:?} is invalid: {err}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}

fn peer_roster(total_processes: u32, peer_port: u16) -> anyhow::Result<Vec<String>> {
    if let Ok(raw) = std::env::var("PEER_HOSTS") {
        let hosts: Vec<_> = raw
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| format!("{host}:{peer_port}"))
            .collect();
        anyhow::ensure!(
            hosts.len() as u32 == total_processes,
            "PEER_HOSTS lists {} hosts but TOTAL_PROCESSES is {total_processes}",
            hosts.len()
        );
        return Ok(hosts);
    }
    let service_name =
        std::env::var("ROSTER_SERVICE_NAME").unwrap_or_else(|_| "coord-service".to_string());
    Ok((0..total_processes)
        .map(|i| format!("{service_name}-{i}.{service_name}-service:{peer_port}"))
        .collect())
}

fn delay_hook_from_env() -> anyhow::Result<Option<DelayHook>> {
    let Ok(message_id) = std::env::var("DELAY_TRIGGER_MESSAGE_ID") else {
        return Ok(None);
    };
    let process_id = env_or("DELAY_PROCESS_ID", 0u32)?;
    let delay_seconds = env_or("DELAY_SECONDS", 0u64)?;
    Ok(Some(DelayHook {
        message_id,
        process_id,
        delay: Duration::from_secs(delay_seconds),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statefulset_roster_is_stable_and_distinct() {
        let hosts = peer_roster(3, 8080).unwrap();
        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0], "coord-service-0.coord-service-service:8080");
        assert_ne!(hosts[0], hosts[1]);
    }

    #[test]
    fn peer_hosts_override_is_honored() {
        std::env::set_var("PEER_HOSTS", "a,b,c");
        let hosts = peer_roster(3, 9000).unwrap();
        std::env::remove_var("PEER_HOSTS");
        assert_eq!(hosts, vec!["a:9000", "b:9000", "c:9000"]);
    }

    #[test]
    fn peer_hosts_count_mismatch_is_rejected() {
        std::env::set_var("PEER_HOSTS", "a,b");
        let err = peer_roster(3, 9000).unwrap_err();
        std::env::remove_var("PEER_HOSTS");
        assert!(err.to_string().contains("lists 2 hosts"));
    }
}
