//! Driver that programs the kernel IPVS table through the `ipvsadm` CLI.
//!
//! Live state is read with `ipvsadm -S -n`, whose output is the same
//! command syntax used to write it:
//!
//! ```text
//! -A -t 10.0.0.5:80 -s wrr -p 300 -M 255.255.255.255
//! -a -t 10.0.0.5:80 -r 10.0.0.7:8080 -m -w 1
//! -A -f 7 -s rr
//! ```

use crate::reconcile::{live_key, server_converged};
use async_trait::async_trait;
use tiller_core::{Balancer, Protocol, Result, Server, Service, TillerError};
use tokio::process::Command;
use tracing::debug;

pub struct IpvsadmBalancer {
    program: String,
}

impl IpvsadmBalancer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, args = ?args, "ipvsadm");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| TillerError::Balancer(format!("failed to run {}: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TillerError::Balancer(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn live(&self, service: &Service) -> Result<Option<Service>> {
        let key = live_key(service);
        Ok(self
            .services()
            .await?
            .into_iter()
            .find(|s| live_key(s) == key))
    }
}

#[async_trait]
impl Balancer for IpvsadmBalancer {
    async fn services(&self) -> Result<Vec<Service>> {
        let dump = self.run(&["-S".to_string(), "-n".to_string()]).await?;
        parse_save(&dump)
    }

    async fn apply(&self, service: &Service) -> Result<()> {
        let Some(have) = self.live(service).await? else {
            self.run(&service_args("-A", service)).await?;
            for server in &service.servers {
                self.run(&server_args("-a", service, server)).await?;
            }
            return Ok(());
        };

        if service_attrs_differ(service, &have) {
            self.run(&service_args("-E", service)).await?;
        }
        for stale in have
            .servers
            .iter()
            .filter(|h| service.server(&h.id).is_none())
        {
            self.run(&server_args("-d", service, stale)).await?;
        }
        for want in &service.servers {
            match have.server(&want.id) {
                Some(current) if server_converged(want, current) => {}
                Some(_) => {
                    self.run(&server_args("-e", service, want)).await?;
                }
                None => {
                    self.run(&server_args("-a", service, want)).await?;
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, service: &Service) -> Result<()> {
        let mut args = vec!["-D".to_string()];
        args.extend(service_target(service));
        self.run(&args).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "ipvsadm"
    }
}

fn service_attrs_differ(want: &Service, have: &Service) -> bool {
    (!want.scheduler.is_empty() && want.scheduler != have.scheduler)
        || want.persistence != have.persistence
        || (want.persistence > 0 && !want.netmask.is_empty() && want.netmask != have.netmask)
}

fn endpoint(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// `-t addr:port`, `-u addr:port` or `-f mark`.
fn service_target(service: &Service) -> Vec<String> {
    match service.kind {
        Protocol::Tcp => vec!["-t".into(), endpoint(&service.host, service.port)],
        Protocol::Udp => vec!["-u".into(), endpoint(&service.host, service.port)],
        Protocol::Fwmark => vec!["-f".into(), service.port.to_string()],
    }
}

pub(crate) fn service_args(op: &str, service: &Service) -> Vec<String> {
    let mut args = vec![op.to_string()];
    args.extend(service_target(service));
    if !service.scheduler.is_empty() {
        args.extend(["-s".to_string(), service.scheduler.clone()]);
    }
    if service.persistence > 0 {
        args.extend(["-p".to_string(), service.persistence.to_string()]);
        if !service.netmask.is_empty() {
            args.extend(["-M".to_string(), service.netmask.clone()]);
        }
    }
    args
}

pub(crate) fn server_args(op: &str, service: &Service, server: &Server) -> Vec<String> {
    let mut args = vec![op.to_string()];
    args.extend(service_target(service));
    args.extend(["-r".to_string(), endpoint(&server.host, server.port)]);
    if op == "-d" {
        return args;
    }
    match server.forwarder.as_str() {
        "g" => args.push("-g".into()),
        "i" => args.push("-i".into()),
        "m" => args.push("-m".into()),
        _ => {}
    }
    args.extend(["-w".to_string(), server.weight.to_string()]);
    if server.upper_threshold > 0 {
        args.extend(["-x".to_string(), server.upper_threshold.to_string()]);
    }
    if server.lower_threshold > 0 {
        args.extend(["-y".to_string(), server.lower_threshold.to_string()]);
    }
    args
}

fn parse_endpoint(raw: &str) -> Result<(String, u16)> {
    let bad = || TillerError::Balancer(format!("unparseable ipvsadm address '{raw}'"));
    let (host, port) = match raw.strip_prefix('[') {
        Some(rest) => rest.split_once("]:").ok_or_else(bad)?,
        None => raw.rsplit_once(':').ok_or_else(bad)?,
    };
    let port = port.parse::<u16>().map_err(|_| bad())?;
    Ok((host.to_string(), port))
}

fn parse_target(flag: &str, value: &str) -> Result<Service> {
    let (kind, host, port) = match flag {
        "-t" => {
            let (h, p) = parse_endpoint(value)?;
            (Protocol::Tcp, h, p)
        }
        "-u" => {
            let (h, p) = parse_endpoint(value)?;
            (Protocol::Udp, h, p)
        }
        "-f" => {
            // The mark is stored in the 16-bit port field.
            let mark = value.parse::<u16>().map_err(|_| {
                TillerError::Balancer(format!("unsupported firewall mark '{value}'"))
            })?;
            (Protocol::Fwmark, "0.0.0.0".to_string(), mark)
        }
        other => {
            return Err(TillerError::Balancer(format!(
                "unknown ipvsadm service flag '{other}'"
            )));
        }
    };
    Ok(Service::new(kind, host, port))
}

fn number(flag: &str, value: Option<&str>) -> Result<u32> {
    value
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| TillerError::Balancer(format!("missing or bad value for {flag}")))
}

/// Parse `ipvsadm -S -n` output into services with their pools.
pub fn parse_save(dump: &str) -> Result<Vec<Service>> {
    let mut services: Vec<Service> = Vec::new();

    for line in dump.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut tokens = line.split_whitespace();
        let op = tokens.next().unwrap_or_default();
        let mut target: Option<Service> = None;
        let mut server: Option<Server> = None;
        let mut scheduler = String::new();
        let mut persistence = 0;
        let mut netmask = String::new();

        while let Some(flag) = tokens.next() {
            match flag {
                "-t" | "-u" | "-f" => {
                    let value = tokens.next().unwrap_or_default();
                    target = Some(parse_target(flag, value)?);
                }
                "-s" => scheduler = tokens.next().unwrap_or_default().to_string(),
                "-p" => persistence = number(flag, tokens.next())?,
                "-M" => netmask = tokens.next().unwrap_or_default().to_string(),
                "-r" => {
                    let (host, port) = parse_endpoint(tokens.next().unwrap_or_default())?;
                    server = Some(Server::new(host, port));
                }
                "-g" | "-i" | "-m" => {
                    if let Some(srv) = server.as_mut() {
                        srv.forwarder = flag.trim_start_matches('-').to_string();
                    }
                }
                "-w" | "-x" | "-y" => {
                    let value = number(flag, tokens.next())?;
                    if let Some(srv) = server.as_mut() {
                        match flag {
                            "-w" => srv.weight = value,
                            "-x" => srv.upper_threshold = value,
                            _ => srv.lower_threshold = value,
                        }
                    }
                }
                _ => {}
            }
        }

        let Some(mut svc) = target else { continue };
        svc.gen_id();
        match op {
            "-A" => {
                svc.scheduler = scheduler;
                svc.persistence = persistence;
                svc.netmask = netmask;
                services.push(svc);
            }
            "-a" => {
                let Some(mut srv) = server else { continue };
                srv.gen_id();
                let key = live_key(&svc);
                match services.iter_mut().find(|s| live_key(s) == key) {
                    Some(owner) => owner.upsert_server(srv),
                    None => {
                        return Err(TillerError::Balancer(format!(
                            "real server listed before its service {}",
                            svc.id
                        )));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
-A -t 10.0.0.5:80 -s wrr -p 300 -M 255.255.255.255
-a -t 10.0.0.5:80 -r 10.0.0.7:8080 -m -w 1
-a -t 10.0.0.5:80 -r 10.0.0.8:8080 -g -w 3 -x 100 -y 10
-A -u [2001:db8::1]:53 -s rr
-a -u [2001:db8::1]:53 -r [2001:db8::2]:53 -m -w 1
-A -f 7 -s sh
";

    #[test]
    fn parses_services_and_pools() {
        let services = parse_save(DUMP).unwrap();
        assert_eq!(services.len(), 3);

        let web = &services[0];
        assert_eq!(web.id, "tcp-10_0_0_5-80");
        assert_eq!(web.scheduler, "wrr");
        assert_eq!(web.persistence, 300);
        assert_eq!(web.netmask, "255.255.255.255");
        assert_eq!(web.servers.len(), 2);
        assert_eq!(web.servers[0].forwarder, "m");
        assert_eq!(web.servers[1].id, "10_0_0_8-8080");
        assert_eq!(web.servers[1].weight, 3);
        assert_eq!(web.servers[1].upper_threshold, 100);
        assert_eq!(web.servers[1].lower_threshold, 10);
    }

    #[test]
    fn parses_bracketed_ipv6_and_fwmark() {
        let services = parse_save(DUMP).unwrap();
        assert_eq!(services[1].kind, Protocol::Udp);
        assert_eq!(services[1].host, "2001:db8::1");
        assert_eq!(services[1].servers[0].host, "2001:db8::2");

        assert_eq!(services[2].kind, Protocol::Fwmark);
        assert_eq!(services[2].port, 7);
        assert!(services[2].servers.is_empty());
    }

    #[test]
    fn empty_dump_is_empty_table() {
        assert!(parse_save("").unwrap().is_empty());
    }

    #[test]
    fn marks_beyond_port_range_are_rejected() {
        let err = parse_save("-A -f 70000 -s wlc").unwrap_err();
        assert!(err.to_string().contains("unsupported firewall mark '70000'"));
        assert_eq!(parse_save("-A -f 65535 -s wlc").unwrap()[0].port, 65535);
    }

    #[test]
    fn rejects_garbage_address() {
        assert!(parse_save("-A -t 10.0.0.5 -s rr").is_err());
    }

    #[test]
    fn service_args_include_persistence_only_when_set() {
        let mut svc = Service::new(Protocol::Tcp, "10.0.0.5", 80);
        svc.scheduler = "wrr".into();
        svc.netmask = "255.255.255.0".into();
        assert_eq!(service_args("-A", &svc), ["-A", "-t", "10.0.0.5:80", "-s", "wrr"]);

        svc.persistence = 60;
        assert_eq!(
            service_args("-E", &svc),
            ["-E", "-t", "10.0.0.5:80", "-s", "wrr", "-p", "60", "-M", "255.255.255.0"]
        );
    }

    #[test]
    fn server_args_map_forwarder_and_thresholds() {
        let svc = Service::new(Protocol::Fwmark, "10.0.0.5", 7);
        let mut srv = Server::new("10.0.0.7", 8080);
        srv.forwarder = "i".into();
        srv.weight = 2;
        srv.upper_threshold = 50;
        assert_eq!(
            server_args("-a", &svc, &srv),
            ["-a", "-f", "7", "-r", "10.0.0.7:8080", "-i", "-w", "2", "-x", "50"]
        );
        assert_eq!(
            server_args("-d", &svc, &srv),
            ["-d", "-f", "7", "-r", "10.0.0.7:8080"]
        );
    }
}
