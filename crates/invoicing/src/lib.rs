//! Invoicing domain module: GST invoices and their payments.
//!
//! This crate contains business rules for invoices and receivables,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod gst;
pub mod invoice;

pub use gst::{compute_line, GstRate, InvoiceTotals, LineAmounts, SupplyType};
pub use invoice::{
    compute_totals, CancelInvoice, CreateDraft, EffectiveStatus, Invoice, InvoiceCommand,
    InvoiceEvent, InvoiceId, InvoiceLine, InvoiceStatus, IssueInvoice, Payment, RecordPayment,
    ReplaceLines,
};
