//! An in-memory kernel that answers the `ip` and `ipset` invocations issued
//! by this crate, for tests.

use crate::exec::{render, Error, Exec};
use ambient_redirect_core::MacAddr;
use parking_lot::Mutex;
use serde_json::json;
use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
};

/// A host-side veth and what the kernel knows about its peer.
#[derive(Clone, Debug)]
pub struct Veth {
    pub device: String,
    pub ifindex: u32,
    pub peer_index: Option<u32>,
    pub nsid: Option<i64>,
    /// Name bound to `nsid`, if any.
    pub ns: Option<String>,
    pub mac: Option<MacAddr>,
}

#[derive(Default)]
pub struct FakeKernel {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    routes: BTreeSet<String>,
    /// set name -> address -> comment
    ipsets: BTreeMap<String, BTreeMap<String, String>>,
    devices: BTreeMap<IpAddr, Device>,
    local_addrs: Vec<IpAddr>,
    files: BTreeMap<PathBuf, String>,
    failing: Vec<String>,
    calls: Vec<String>,
}

#[derive(Clone, Debug)]
enum Device {
    Veth(Veth),
    Other { name: String, ifindex: u32 },
}

const MUTATIONS: [&str; 5] = [
    "ip route add ",
    "ip route del ",
    "ipset add ",
    "ipset del ",
    "write ",
];

fn failed(command: &str, stderr: &str) -> Error {
    Error::Failed {
        command: command.to_string(),
        status: ExitStatus::from_raw(1 << 8),
        stderr: stderr.to_string(),
    }
}

// === impl FakeKernel ===

impl FakeKernel {
    pub fn with_veth(self, ip: IpAddr, veth: Veth) -> Self {
        self.state.lock().devices.insert(ip, Device::Veth(veth));
        self
    }

    /// Routes `ip` through a device that is not a veth.
    pub fn with_device(self, ip: IpAddr, name: &str, ifindex: u32) -> Self {
        self.state.lock().devices.insert(
            ip,
            Device::Other {
                name: name.to_string(),
                ifindex,
            },
        );
        self
    }

    pub fn with_local_addr(self, ip: IpAddr) -> Self {
        self.state.lock().local_addrs.push(ip);
        self
    }

    /// Fails every command line starting with `prefix`.
    pub fn failing(self, prefix: &str) -> Self {
        self.state.lock().failing.push(prefix.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls that would have changed kernel state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATIONS.iter().any(|m| c.starts_with(*m)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Installed routes, rendered as `ip route` arguments.
    pub fn routes(&self) -> Vec<String> {
        self.state.lock().routes.iter().cloned().collect()
    }

    /// `(address, comment)` pairs in the named set.
    pub fn ipset(&self, name: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .ipsets
            .get(name)
            .map(|set| set.iter().map(|(a, c)| (a.clone(), c.clone())).collect())
            .unwrap_or_default()
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }
}

impl State {
    fn device_named(&self, name: &str) -> Option<&Device> {
        self.devices.values().find(|d| match d {
            Device::Veth(v) => v.device == name,
            Device::Other { name: n, .. } => n == name,
        })
    }

    fn veths(&self) -> impl Iterator<Item = &Veth> {
        self.devices.values().filter_map(|d| match d {
            Device::Veth(v) => Some(v),
            Device::Other { .. } => None,
        })
    }

    fn handle(&mut self, command: &str, program: &str, args: &[&str]) -> Result<String, Error> {
        match (program, args) {
            ("ip", ["route", "show", rest @ ..]) => {
                let route = rest.join(" ");
                Ok(if self.routes.contains(&route) {
                    format!("{route}\n")
                } else {
                    String::new()
                })
            }
            ("ip", ["route", "add", rest @ ..]) => {
                if self.routes.insert(rest.join(" ")) {
                    Ok(String::new())
                } else {
                    Err(failed(command, "RTNETLINK answers: File exists"))
                }
            }
            ("ip", ["route", "del", rest @ ..]) => {
                if self.routes.remove(&rest.join(" ")) {
                    Ok(String::new())
                } else {
                    Err(failed(command, "RTNETLINK answers: No such process"))
                }
            }
            ("ip", ["-j", "route", "get", dst]) => {
                let dev = dst
                    .parse::<IpAddr>()
                    .ok()
                    .and_then(|ip| self.devices.get(&ip))
                    .map(|d| match d {
                        Device::Veth(v) => v.device.clone(),
                        Device::Other { name, .. } => name.clone(),
                    })
                    .ok_or_else(|| failed(command, "RTNETLINK answers: Network is unreachable"))?;
                Ok(json!([{ "dst": dst, "dev": dev, "flags": [], "uid": 0, "cache": [] }]).to_string())
            }
            ("ip", ["-j", "-d", "link", "show", "dev", name]) => {
                let link = match self.device_named(name) {
                    Some(Device::Veth(v)) => json!({
                        "ifindex": v.ifindex,
                        "link_index": v.peer_index,
                        "ifname": v.device,
                        "link_netnsid": v.nsid,
                        "linkinfo": { "info_kind": "veth" },
                    }),
                    Some(Device::Other { name, ifindex }) => json!({
                        "ifindex": ifindex,
                        "ifname": name,
                        "linkinfo": { "info_kind": "bridge" },
                    }),
                    None => {
                        return Err(failed(
                            command,
                            &format!("Device \"{name}\" does not exist."),
                        ))
                    }
                };
                Ok(json!([link]).to_string())
            }
            ("ip", ["-j", "netns", "list-id"]) => {
                let ids = self
                    .veths()
                    .filter_map(|v| {
                        let nsid = v.nsid?;
                        Some(match &v.ns {
                            Some(name) => json!({ "nsid": nsid, "current-nsid": nsid, "name": name }),
                            None => json!({ "nsid": nsid, "current-nsid": nsid }),
                        })
                    })
                    .collect::<Vec<_>>();
                Ok(serde_json::Value::from(ids).to_string())
            }
            ("ip", ["-n", ns, "-j", "link", "show"]) => {
                let peers = self
                    .veths()
                    .filter(|v| v.ns.as_deref() == Some(*ns))
                    .collect::<Vec<_>>();
                if peers.is_empty() {
                    return Err(failed(
                        command,
                        &format!("Cannot open network namespace \"{ns}\": No such file or directory"),
                    ));
                }
                let mut links = vec![json!({ "ifindex": 1, "ifname": "lo", "address": "00:00:00:00:00:00" })];
                links.extend(peers.into_iter().filter_map(|v| {
                    let index = v.peer_index?;
                    Some(match v.mac {
                        Some(mac) => json!({ "ifindex": index, "ifname": "eth0", "address": mac.to_string() }),
                        None => json!({ "ifindex": index, "ifname": "eth0" }),
                    })
                }));
                Ok(serde_json::Value::from(links).to_string())
            }
            ("ip", ["-j", "addr", "show"]) => {
                let ifaces = self
                    .local_addrs
                    .iter()
                    .enumerate()
                    .map(|(i, ip)| {
                        json!({
                            "ifindex": i + 1,
                            "ifname": format!("if{}", i + 1),
                            "addr_info": [{ "local": ip.to_string() }],
                        })
                    })
                    .collect::<Vec<_>>();
                Ok(serde_json::Value::from(ifaces).to_string())
            }
            ("ipset", ["save", set]) => {
                let mut out = String::new();
                for (addr, comment) in self.ipsets.get(*set).into_iter().flatten() {
                    out.push_str(&format!("add {set} {addr} comment \"{comment}\"\n"));
                }
                Ok(out)
            }
            ("ipset", ["add", set, addr, "comment", uid]) => {
                let entries = self.ipsets.entry(set.to_string()).or_default();
                if entries.contains_key(*addr) {
                    return Err(failed(
                        command,
                        "ipset v7.15: Element cannot be added to the set: it's already added",
                    ));
                }
                entries.insert(addr.to_string(), uid.to_string());
                Ok(String::new())
            }
            ("ipset", ["del", set, addr]) => {
                let removed = self
                    .ipsets
                    .get_mut(*set)
                    .and_then(|entries| entries.remove(*addr));
                match removed {
                    Some(_) => Ok(String::new()),
                    None => Err(failed(
                        command,
                        "ipset v7.15: Element cannot be deleted from the set: it's not added",
                    )),
                }
            }
            _ => Err(failed(command, "unsupported command")),
        }
    }
}

#[async_trait::async_trait]
impl Exec for FakeKernel {
    async fn output(&self, program: &str, args: &[String]) -> Result<String, Error> {
        let command = render(program, args);
        let mut state = self.state.lock();
        state.calls.push(command.clone());
        if state.failing.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(failed(&command, "injected failure"));
        }
        let args = args.iter().map(String::as_str).collect::<Vec<_>>();
        state.handle(&command, program, &args)
    }

    async fn write_file(&self, path: &Path, value: &str) -> Result<(), Error> {
        let command = format!("write {} {value}", path.display());
        let mut state = self.state.lock();
        state.calls.push(command.clone());
        if state.failing.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(Error::Write {
                path: path.to_path_buf(),
                source: std::io::ErrorKind::PermissionDenied.into(),
            });
        }
        state.files.insert(path.to_path_buf(), value.to_string());
        Ok(())
    }
}
