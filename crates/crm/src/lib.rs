//! CRM module: sales leads, their pipeline, and conversion into clients.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod client;
pub mod lead;
pub mod pipeline;

pub use client::{client_from_lead, Client, ClientId};
pub use lead::{
    ChangeLeadStatus, ConvertLead, CreateLead, Lead, LeadCommand, LeadDetails, LeadEvent, LeadId, LeadStatus,
    ScheduleFollowUp, UpdateLeadDetails,
};
pub use pipeline::{pipeline_summary, PipelineStage};
