//! Description of the build machine for report titles

use std::env;
use std::thread;
use sysinfo::{DiskKind, Disks, System};

const GIB: u64 = 1 << 30;

/// Static facts about the machine the build ran on
///
/// Probes that can fail on some platforms are optional and left out of the
/// description when unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub cpu_mhz: Option<u64>,
    pub total_memory_bytes: Option<u64>,
    pub disk_kind: Option<StorageKind>,
    pub os: String,
    pub arch: String,
}

/// Storage technology of the machine's disks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Ssd,
    Hdd,
}

impl StorageKind {
    fn label(self) -> &'static str {
        match self {
            StorageKind::Ssd => "SSD",
            StorageKind::Hdd => "HDD",
        }
    }
}

impl MachineInfo {
    /// Probe the current machine
    ///
    /// The logical core count falls back to 1 when it cannot be determined.
    pub fn current() -> Self {
        let logical_cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let total_memory_bytes = Some(sys.total_memory()).filter(|&b| b > 0);
        let cpu_mhz = sys
            .cpus()
            .first()
            .map(|cpu| cpu.frequency())
            .filter(|&mhz| mhz > 0);

        let disks = Disks::new_with_refreshed_list();
        let disk_kind = storage_kind(disks.list().iter().map(|d| d.kind()));

        let info = Self {
            logical_cores,
            physical_cores: sys.physical_core_count(),
            cpu_mhz,
            total_memory_bytes,
            disk_kind,
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
        };
        tracing::debug!(?info, "probed machine");
        info
    }

    /// More logical than physical cores
    pub fn hyper_threading(&self) -> Option<bool> {
        self.physical_cores.map(|p| self.logical_cores > p)
    }

    /// `"Cores: 8 logical, 4 physical (HT)<sep>CPU: 3600 MHz<sep>RAM: 32 GB<sep>Disk: SSD<sep>OS: linux<sep>Arch: x86_64"`
    pub fn describe(&self, separator: &str) -> String {
        let mut cores = format!("Cores: {} logical", self.logical_cores);
        if let Some(physical) = self.physical_cores {
            cores.push_str(&format!(", {} physical", physical));
            if self.hyper_threading() == Some(true) {
                cores.push_str(" (HT)");
            }
        }

        let mut parts = vec![cores];
        if let Some(mhz) = self.cpu_mhz {
            parts.push(format!("CPU: {} MHz", mhz));
        }
        if let Some(bytes) = self.total_memory_bytes {
            parts.push(format!("RAM: {} GB", (bytes + GIB / 2) / GIB));
        }
        if let Some(kind) = self.disk_kind {
            parts.push(format!("Disk: {}", kind.label()));
        }
        parts.push(format!("OS: {}", self.os));
        parts.push(format!("Arch: {}", self.arch));
        parts.join(separator)
    }
}

/// SSD when any disk is solid state, HDD when only rotational disks are known
fn storage_kind(kinds: impl IntoIterator<Item = DiskKind>) -> Option<StorageKind> {
    let mut found = None;
    for kind in kinds {
        match kind {
            DiskKind::SSD => return Some(StorageKind::Ssd),
            DiskKind::HDD => found = Some(StorageKind::Hdd),
            DiskKind::Unknown(_) => {}
        }
    }
    found
}
