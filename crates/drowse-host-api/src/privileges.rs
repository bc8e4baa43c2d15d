//! Platform privileges the service depends on

use std::fmt;

/// A Proxmox privilege needed by some part of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// List VMs and containers
    VmAudit,
    /// Shut VMs and containers down
    VmPowerMgmt,
    /// Read node status
    SysAudit,
    /// Shut nodes down
    SysPowerMgmt,
}

impl Privilege {
    pub const ALL: [Privilege; 4] = [
        Privilege::VmAudit,
        Privilege::VmPowerMgmt,
        Privilege::SysAudit,
        Privilege::SysPowerMgmt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::VmAudit => "VM.Audit",
            Self::VmPowerMgmt => "VM.PowerMgmt",
            Self::SysAudit => "Sys.Audit",
            Self::SysPowerMgmt => "Sys.PowerMgmt",
        }
    }

    pub fn purpose(&self) -> &'static str {
        match self {
            Self::VmAudit => "list VMs and containers",
            Self::VmPowerMgmt => "shut down VMs and containers",
            Self::SysAudit => "read node status",
            Self::SysPowerMgmt => "shut down nodes",
        }
    }

    /// Whether holding this privilege can be verified with a read-only call.
    /// Power privileges can only be exercised by actually powering something off.
    pub fn is_probeable(&self) -> bool {
        matches!(self, Self::VmAudit | Self::SysAudit)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.purpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_audit_privileges_are_probeable() {
        let probeable: Vec<_> = Privilege::ALL.iter().filter(|p| p.is_probeable()).collect();
        assert_eq!(probeable, vec![&Privilege::VmAudit, &Privilege::SysAudit]);
    }

    #[test]
    fn display_names_privilege_and_purpose() {
        assert_eq!(
            Privilege::SysPowerMgmt.to_string(),
            "Sys.PowerMgmt (shut down nodes)"
        );
    }
}
