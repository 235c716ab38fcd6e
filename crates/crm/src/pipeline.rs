//! Sales pipeline roll-up.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use agencyhub_core::{CurrencyCode, Money};

use crate::lead::{Lead, LeadStatus};

/// One column of the pipeline board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub status: LeadStatus,
    pub count: u64,
    /// Estimated value per currency; leads are never converted here.
    pub estimated_value: Vec<Money>,
}

/// Count leads and sum their estimated value for every status, in pipeline
/// order. Stages without leads are included with zero counts.
pub fn pipeline_summary<'a>(leads: impl IntoIterator<Item = &'a Lead>) -> Vec<PipelineStage> {
    let mut counts: BTreeMap<LeadStatus, u64> = BTreeMap::new();
    let mut values: BTreeMap<(LeadStatus, CurrencyCode), i64> = BTreeMap::new();

    for lead in leads {
        let status = lead.status();
        *counts.entry(status).or_default() += 1;
        let value = lead.details().estimated_value;
        let total = values.entry((status, value.currency)).or_default();
        *total = total.saturating_add(value.amount);
    }

    LeadStatus::ALL
        .into_iter()
        .map(|status| PipelineStage {
            status,
            count: counts.get(&status).copied().unwrap_or(0),
            estimated_value: values
                .iter()
                .filter(|((s, _), _)| *s == status)
                .map(|((_, currency), amount)| Money::new(*amount, *currency))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::{ChangeLeadStatus, CreateLead, LeadCommand, LeadDetails, LeadId};
    use agencyhub_core::{AgencyId, Aggregate, RecordId};
    use chrono::Utc;

    fn lead(agency: AgencyId, value: Money, status: Option<LeadStatus>) -> Lead {
        let id = LeadId::new(RecordId::new());
        let mut lead = Lead::empty(id);
        let mut cmds = vec![LeadCommand::Create(CreateLead {
            agency_id: agency,
            lead_id: id,
            details: LeadDetails {
                name: "Lead".into(),
                company: None,
                email: None,
                phone: None,
                source: None,
                estimated_value: value,
                assigned_to: None,
                notes: None,
            },
            occurred_at: Utc::now(),
        })];
        if let Some(status) = status {
            cmds.push(LeadCommand::ChangeStatus(ChangeLeadStatus {
                agency_id: agency,
                lead_id: id,
                status,
                occurred_at: Utc::now(),
            }));
        }
        for cmd in cmds {
            lead.execute(&cmd).unwrap();
        }
        lead
    }

    #[test]
    fn summary_groups_by_status_and_currency() {
        let agency = AgencyId::new();
        let leads = vec![
            lead(agency, Money::new(100, CurrencyCode::INR), None),
            lead(agency, Money::new(250, CurrencyCode::INR), None),
            lead(agency, Money::new(40, CurrencyCode::USD), None),
            lead(agency, Money::new(900, CurrencyCode::INR), Some(LeadStatus::Lost)),
        ];

        let summary = pipeline_summary(&leads);
        assert_eq!(summary.len(), LeadStatus::ALL.len());

        let new = &summary[0];
        assert_eq!(new.status, LeadStatus::New);
        assert_eq!(new.count, 3);
        assert_eq!(
            new.estimated_value,
            vec![Money::new(350, CurrencyCode::INR), Money::new(40, CurrencyCode::USD)]
        );

        let lost = summary.iter().find(|s| s.status == LeadStatus::Lost).unwrap();
        assert_eq!(lost.count, 1);

        let won = summary.iter().find(|s| s.status == LeadStatus::Won).unwrap();
        assert_eq!(won.count, 0);
        assert!(won.estimated_value.is_empty());
    }
}
