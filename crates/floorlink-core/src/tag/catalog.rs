// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The static tag catalog.
//!
//! Every automation-server variable the gateway touches is listed here with its
//! bit-exact address suffix, declared type, direction, and monitoring policy.
//! Suffixes are joined to the configured node prefix at bind time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{NodeAddress, TagDirection, ValueType};

// =============================================================================
// Monitoring
// =============================================================================

/// When the gateway holds a monitored item on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitoring {
    /// Monitored for the whole session.
    Always,
    /// Monitored only while a login handshake waits for credentials.
    DuringLogin,
    /// Never monitored.
    Never,
}

// =============================================================================
// TagKey
// =============================================================================

/// Logical identity of a catalog tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKey {
    /// Login result code: 8 approve, 7 reject.
    AuthApprove,
    /// Display name of the authorized user.
    AuthName,
    /// Numeric access level of the authorized user.
    AuthAccessLevel,
    /// HMI username field.
    Username,
    /// HMI password field.
    Password,
    /// Login request: 1 requested, 0 acknowledged.
    AuthRequest,
    /// Machine asks for a new job.
    JobRequest,
    /// Machine power ready.
    PowerStatus,
    /// Vision system ready.
    VisionStatus,
    /// Job identifier.
    JobId,
    /// Job process name.
    JobProcessName,
    /// Job material code.
    JobMaterialCode,
    /// Job recipe name.
    JobRecipeName,
    /// Planned quantity.
    JobPlanQty,
    /// Planned start time.
    JobPlanStartTime,
    /// Planned end time.
    JobPlanEndTime,
    /// Product model.
    JobModel,
    /// Product length.
    JobLength,
    /// Product color.
    JobColor,
    /// Conveyor speed parameter.
    ConveyorSpeed,
    /// Job dispatch result code: 8 approve, 7 reject.
    JobApprove,
    /// Latest vision inspection result.
    VisionResult,
    /// Machine has consumed the vision result.
    VisionResultRead,
    /// Good parts counter.
    GoodParts,
    /// Parts rejected for size.
    RejectSizeParts,
    /// Parts rejected for color.
    RejectColorParts,
    /// Total parts counter.
    TotalParts,
    /// Machine is processing a job.
    JobBusy,
    /// Machine finished the current job.
    JobCompleted,
    /// Current machine step.
    MachineStep,
    /// Object present at the station.
    ObjectPresent,
    /// HMI user logged out.
    UserLogout,
    /// Material (card) ready at the station.
    MaterialReady,
}

/// Static description of a catalog tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    /// Logical identity.
    pub key: TagKey,
    /// Address suffix below the node prefix.
    pub path: &'static str,
    /// Access direction.
    pub direction: TagDirection,
    /// Declared value type.
    pub value_type: ValueType,
    /// Monitoring policy.
    pub monitoring: Monitoring,
}

impl TagSpec {
    /// Returns the full remote address under `prefix`.
    pub fn address(&self, prefix: &str) -> NodeAddress {
        NodeAddress::join(prefix, self.path)
    }
}

macro_rules! spec {
    ($key:ident, $path:literal, $dir:ident, $ty:ident, $mon:ident) => {
        TagSpec {
            key: TagKey::$key,
            path: $path,
            direction: TagDirection::$dir,
            value_type: ValueType::$ty,
            monitoring: Monitoring::$mon,
        }
    };
}

/// The complete catalog, in bind order.
pub const CATALOG: &[TagSpec] = &[
    spec!(AuthApprove, "autho_approve", WriteOnly, Int16, Never),
    spec!(AuthName, "autho_name", WriteOnly, String, Never),
    spec!(AuthAccessLevel, "autho_accessLevel", WriteOnly, Int16, Never),
    spec!(Username, "username", ReadOnly, String, DuringLogin),
    spec!(Password, "password", ReadOnly, String, DuringLogin),
    spec!(AuthRequest, "autho_request", ReadWrite, Int16, Always),
    spec!(JobRequest, "job_request", ReadOnly, Int16, Always),
    spec!(PowerStatus, "power_status", ReadOnly, UInt16, Always),
    spec!(VisionStatus, "vision.VISION_STATUS", ReadOnly, UInt16, Always),
    spec!(JobId, "job.job_ID", WriteOnly, String, Never),
    spec!(JobProcessName, "job.job_ProcessName", WriteOnly, String, Never),
    spec!(JobMaterialCode, "job.job_MaterialCode", WriteOnly, String, Never),
    spec!(JobRecipeName, "job.job_RecipeName", WriteOnly, String, Never),
    spec!(JobPlanQty, "job.job_PlanQty", WriteOnly, Int32, Never),
    spec!(JobPlanStartTime, "job.job_PlanStartTime", WriteOnly, String, Never),
    spec!(JobPlanEndTime, "job.job_PlanEndTime", WriteOnly, String, Never),
    spec!(JobModel, "job.job_Model", WriteOnly, String, Never),
    spec!(JobLength, "job.job_Length", WriteOnly, Int32, Never),
    spec!(JobColor, "job.job_Color", WriteOnly, String, Never),
    spec!(ConveyorSpeed, "parameters.conveyor_Speed", WriteOnly, Int16, Never),
    spec!(JobApprove, "job_approve", WriteOnly, Int16, Never),
    spec!(VisionResult, "vision.RESULT", ReadWrite, UInt16, Always),
    spec!(VisionResultRead, "vision.RESULT_READ", ReadWrite, UInt16, Always),
    spec!(GoodParts, "counter.good_parts", ReadOnly, Int32, Always),
    spec!(RejectSizeParts, "counter.rejectSize_parts", ReadOnly, Int32, Always),
    spec!(RejectColorParts, "counter.rejectColor_parts", ReadOnly, Int32, Always),
    spec!(TotalParts, "counter.total_parts", ReadOnly, Int32, Always),
    spec!(JobBusy, "job_busy", ReadOnly, UInt16, Always),
    spec!(JobCompleted, "job_completed", ReadOnly, UInt16, Always),
    spec!(MachineStep, "machineStep", ReadOnly, Int16, Always),
    spec!(ObjectPresent, "objectPresent", ReadOnly, UInt16, Always),
    spec!(UserLogout, "userLogout", ReadOnly, UInt16, Always),
    spec!(MaterialReady, "materialReady", ReadWrite, UInt16, Always),
];

impl TagKey {
    /// Returns the catalog entry for this key.
    pub fn spec(&self) -> &'static TagSpec {
        // CATALOG is declared in enum order.
        &CATALOG[*self as usize]
    }

    /// Returns the bit-exact address suffix, which doubles as the logical name.
    pub fn name(&self) -> &'static str {
        self.spec().path
    }

    /// Returns the declared direction.
    pub fn direction(&self) -> TagDirection {
        self.spec().direction
    }

    /// Returns the declared value type.
    pub fn value_type(&self) -> ValueType {
        self.spec().value_type
    }

    /// Returns the monitoring policy.
    pub fn monitoring(&self) -> Monitoring {
        self.spec().monitoring
    }

    /// Iterates over every key in catalog order.
    pub fn all() -> impl Iterator<Item = TagKey> {
        CATALOG.iter().map(|spec| spec.key)
    }

    /// Keys monitored for the whole session.
    pub fn always_monitored() -> impl Iterator<Item = TagKey> {
        Self::all().filter(|key| key.monitoring() == Monitoring::Always)
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_in_enum_order() {
        for (index, spec) in CATALOG.iter().enumerate() {
            assert_eq!(spec.key as usize, index, "{} out of order", spec.path);
            assert_eq!(spec.key.spec().path, spec.path);
        }
    }

    #[test]
    fn test_catalog_paths_unique() {
        let paths: HashSet<_> = CATALOG.iter().map(|s| s.path).collect();
        assert_eq!(paths.len(), CATALOG.len());
    }

    #[test]
    fn test_bit_exact_names() {
        assert_eq!(TagKey::AuthAccessLevel.name(), "autho_accessLevel");
        assert_eq!(TagKey::JobId.name(), "job.job_ID");
        assert_eq!(TagKey::VisionStatus.name(), "vision.VISION_STATUS");
        assert_eq!(TagKey::RejectSizeParts.name(), "counter.rejectSize_parts");
        assert_eq!(TagKey::ConveyorSpeed.name(), "parameters.conveyor_Speed");
    }

    #[test]
    fn test_monitoring_policy() {
        assert_eq!(TagKey::Username.monitoring(), Monitoring::DuringLogin);
        assert_eq!(TagKey::Password.monitoring(), Monitoring::DuringLogin);
        assert!(TagKey::always_monitored().all(|k| k.direction().can_read()));
        assert!(TagKey::always_monitored().any(|k| k == TagKey::AuthRequest));
        assert!(!TagKey::always_monitored().any(|k| k == TagKey::JobApprove));
    }

    #[test]
    fn test_address() {
        let address = TagKey::JobRequest.spec().address("ns=2;s=|var|PLC.GVL.OPC_Machine_A0001");
        assert_eq!(address.as_str(), "ns=2;s=|var|PLC.GVL.OPC_Machine_A0001.job_request");
    }
}
