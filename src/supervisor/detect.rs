//! Detection of an already running web server.

use sysinfo::{ProcessRefreshKind, RefreshKind, System, UpdateKind};

const KNOWN_SERVERS: [&str; 2] = ["nginx", "caddy"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedServer {
    pub pid: u32,
    pub name: &'static str,
    pub cmdline: String,
}

/// First process in the table whose command line mentions a known web server.
pub fn detect_existing_server() -> Option<DetectedServer> {
    let system = System::new_with_specifics(
        RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always)),
    );
    let table = system.processes().iter().map(|(pid, process)| {
        let cmdline = process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .filter(|arg| !arg.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (pid.as_u32(), cmdline)
    });
    detect_among(table, std::process::id())
}

/// Match `(pid, command line)` pairs in pid order, ignoring `own_pid`.
pub fn detect_among<I>(table: I, own_pid: u32) -> Option<DetectedServer>
where
    I: IntoIterator<Item = (u32, String)>,
{
    let mut table: Vec<(u32, String)> = table.into_iter().filter(|(pid, _)| *pid != own_pid).collect();
    table.sort_unstable_by_key(|(pid, _)| *pid);

    for (pid, cmdline) in table {
        // Kernel threads have an empty command line.
        if cmdline.is_empty() {
            continue;
        }
        let found = KNOWN_SERVERS
            .into_iter()
            .filter_map(|name| cmdline.find(name).map(|at| (at, name)))
            .min_by_key(|(at, _)| *at)
            .map(|(_, name)| name);
        if let Some(name) = found {
            tracing::debug!(pid, name, cmdline = %cmdline, "existing web server found");
            return Some(DetectedServer { pid, name, cmdline });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(u32, &str)]) -> Vec<(u32, String)> {
        entries.iter().map(|(pid, cmd)| (*pid, cmd.to_string())).collect()
    }

    #[test]
    fn test_detects_first_matching_process() {
        let processes = table(&[
            (1, "/sbin/init"),
            (2, ""),
            (40, "/usr/bin/caddy run"),
            (7, "nginx: master process /usr/sbin/nginx"),
        ]);

        let found = detect_among(processes, 1).unwrap();
        assert_eq!(found.pid, 7);
        assert_eq!(found.name, "nginx");
    }

    #[test]
    fn test_own_process_ignored() {
        let processes = table(&[(9, "./caddy-bin run")]);
        assert_eq!(detect_among(processes.clone(), 9), None);
        assert_eq!(detect_among(processes, 1).map(|s| s.name), Some("caddy"));
    }

    #[test]
    fn test_live_table_excludes_self() {
        if let Some(server) = detect_existing_server() {
            assert_ne!(server.pid, std::process::id());
        }
    }
}
