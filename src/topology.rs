//! CPU and NUMA topology services.
//!
//! Discovery is narrow by design: the number of online CPUs, the NUMA
//! node of the running CPU, and the CPU list of each online node. On
//! Linux the node layout comes from sysfs and the current CPU from
//! `getcpu(2)`; other targets degrade to a single node holding every CPU
//! and pinning becomes a no-op.

use std::io;

/// Upper bound on NUMA nodes tracked by per-node lock arrays.
pub const MAX_NUMA_NODES: usize = 4;

/// Number of online CPUs.
pub fn online_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// NUMA node of the CPU the caller is running on, clamped to
/// [`MAX_NUMA_NODES`].
#[inline]
pub fn current_node() -> usize {
    current_cpu_and_node().1 % MAX_NUMA_NODES
}

/// CPU id the caller is running on.
#[inline]
pub fn current_cpu() -> usize {
    current_cpu_and_node().0
}

#[cfg(target_os = "linux")]
fn current_cpu_and_node() -> (usize, usize) {
    let mut cpu: libc::c_uint = 0;
    let mut node: libc::c_uint = 0;
    let rc = unsafe {
        libc::syscall(
            libc::SYS_getcpu,
            &mut cpu as *mut libc::c_uint,
            &mut node as *mut libc::c_uint,
            core::ptr::null_mut::<libc::c_void>(),
        )
    };
    if rc == 0 {
        (cpu as usize, node as usize)
    } else {
        (0, 0)
    }
}

#[cfg(not(target_os = "linux"))]
fn current_cpu_and_node() -> (usize, usize) {
    (0, 0)
}

/// Pin the calling thread to one CPU.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = core::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        let rc = libc::sched_setaffinity(0, core::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Pin the calling thread to one CPU. No-op off Linux.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> io::Result<()> {
    Ok(())
}

/// Online NUMA nodes and the CPUs belonging to each.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Vec<usize>>,
}

impl Topology {
    /// Discover the host topology, falling back to one node with every
    /// online CPU when sysfs is unavailable.
    pub fn detect() -> Self {
        Self::from_sysfs().unwrap_or_else(|| Self {
            nodes: vec![(0..online_cpus()).collect()],
        })
    }

    #[cfg(target_os = "linux")]
    fn from_sysfs() -> Option<Self> {
        let online = std::fs::read_to_string("/sys/devices/system/node/online").ok()?;
        let mut nodes = Vec::new();
        for node_id in parse_cpu_list(online.trim()) {
            let path = format!("/sys/devices/system/node/node{node_id}/cpulist");
            let cpulist = std::fs::read_to_string(path).ok()?;
            let cpus = parse_cpu_list(cpulist.trim());
            if !cpus.is_empty() {
                nodes.push(cpus);
            }
        }
        if nodes.is_empty() {
            None
        } else {
            Some(Self { nodes })
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn from_sysfs() -> Option<Self> {
        None
    }

    /// Number of online nodes that have CPUs.
    #[inline]
    pub fn nr_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// CPUs of one node.
    #[inline]
    pub fn cpus_of(&self, node: usize) -> &[usize] {
        &self.nodes[node]
    }

    /// Map `nr_threads` workers onto CPUs, filling the first online node
    /// before moving to the next and wrapping when every CPU is taken.
    pub fn compact_cpu_map(&self, nr_threads: usize) -> Vec<usize> {
        let mut map = Vec::with_capacity(nr_threads);
        'fill: loop {
            for node in &self.nodes {
                for &cpu in node {
                    if map.len() == nr_threads {
                        break 'fill;
                    }
                    map.push(cpu);
                }
            }
            if self.nodes.iter().all(|n| n.is_empty()) {
                break;
            }
        }
        map
    }
}

/// Parse a sysfs-style CPU list such as `0-17,72-89`.
fn parse_cpu_list(s: &str) -> Vec<usize> {
    let mut out = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<usize>(), hi.parse::<usize>()) {
                    out.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(v) = part.parse::<usize>() {
                    out.push(v);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        assert_eq!(parse_cpu_list("0"), vec![0]);
    }

    #[test]
    fn test_parse_ranges() {
        assert_eq!(parse_cpu_list("0-3,8,10-11"), vec![0, 1, 2, 3, 8, 10, 11]);
    }

    #[test]
    fn test_parse_garbage_is_skipped() {
        assert_eq!(parse_cpu_list("x,2"), vec![2]);
    }

    #[test]
    fn test_detect_has_cpus() {
        let topo = Topology::detect();
        assert!(topo.nr_nodes() >= 1);
        assert!(!topo.cpus_of(0).is_empty());
    }

    #[test]
    fn test_compact_map_wraps() {
        let topo = Topology {
            nodes: vec![vec![0, 1], vec![2, 3]],
        };
        assert_eq!(topo.compact_cpu_map(6), vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_current_node_bounded() {
        assert!(current_node() < MAX_NUMA_NODES);
    }
}
