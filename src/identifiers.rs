//! Enterprise identifier set and the pre-publish gate over it.
//!
//! UEI and CAGE_CODE are hard requirements: without them no report may leave
//! the building. The four recommended identifiers only produce a warning.
//! The two tiers are deliberately kept apart in [`GateReport`].

use serde::{Deserialize, Serialize};

/// Organization-level registration/compliance codes included verbatim in
/// every outbound payload. Immutable for the duration of a run; an unset
/// identifier is the empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnterpriseIdentifiers {
    pub uei: String,
    pub cage: String,
    pub dodaac_contracting: String,
    pub dodaac_funding: String,
    pub paying_dodaac: String,
    pub fedstrip: String,
    pub finance_unitid: String,
    pub cag_code: String,
    pub ba_codes: String,
    pub scf_code: String,
    pub district_cd: String,
    pub eps: String,
}

/// Outcome of the identifier gate. Publishing proceeds only when
/// `missing_required` is empty; `missing_recommended` is advisory.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub missing_required: Vec<&'static str>,
    pub missing_recommended: Vec<&'static str>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.missing_required.is_empty()
    }
}

impl EnterpriseIdentifiers {
    pub fn check(&self) -> GateReport {
        let mut missing_required = Vec::new();
        if self.uei.trim().is_empty() {
            missing_required.push("UEI");
        }
        if self.cage.trim().is_empty() {
            missing_required.push("CAGE_CODE");
        }

        let recommended = [
            ("dodaac_contracting", self.dodaac_contracting.as_str()),
            ("paying_dodaac", self.paying_dodaac.as_str()),
            ("fedstrip", self.fedstrip.as_str()),
            ("finance_unitid", self.finance_unitid.as_str()),
        ];
        let missing_recommended = recommended
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect();

        GateReport {
            missing_required,
            missing_recommended,
        }
    }
}
