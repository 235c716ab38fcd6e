use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{AgencyId, Aggregate, AggregateRoot, CurrencyCode, DomainError, RecordId};
use agencyhub_crm::ClientId;
use agencyhub_events::Event;

use crate::gst::{compute_line, GstRate, InvoiceTotals, LineAmounts, SupplyType};

/// Invoice identifier (agency-scoped via `agency_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub RecordId);

impl InvoiceId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stored invoice lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// Status as shown to users: the stored status, or `overdue` once an unpaid
/// invoice passes its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Cancelled,
    Overdue,
}

impl EffectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveStatus::Draft => "draft",
            EffectiveStatus::Sent => "sent",
            EffectiveStatus::PartiallyPaid => "partially_paid",
            EffectiveStatus::Paid => "paid",
            EffectiveStatus::Cancelled => "cancelled",
            EffectiveStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            EffectiveStatus::Draft,
            EffectiveStatus::Sent,
            EffectiveStatus::PartiallyPaid,
            EffectiveStatus::Paid,
            EffectiveStatus::Cancelled,
            EffectiveStatus::Overdue,
        ]
        .into_iter()
        .find(|st| st.as_str() == s)
    }
}

/// A billed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    /// HSN (goods) or SAC (services) classification code.
    pub hsn_sac: Option<String>,
    /// Thousandths of a unit.
    pub quantity_milli: i64,
    /// Price per unit in minor currency units.
    pub unit_price: i64,
    /// Discount in basis points.
    #[serde(default)]
    pub discount_bps: u32,
    pub gst_rate: GstRate,
}

impl InvoiceLine {
    pub fn amounts(&self, supply: SupplyType) -> Result<LineAmounts, DomainError> {
        DomainError::require_text("line description", &self.description)?;
        compute_line(
            self.quantity_milli,
            self.unit_price,
            self.discount_bps,
            self.gst_rate,
            supply,
        )
    }
}

/// Compute invoice totals for `lines`.
pub fn compute_totals(lines: &[InvoiceLine], supply: SupplyType) -> Result<InvoiceTotals, DomainError> {
    let mut totals = InvoiceTotals::default();
    for line in lines {
        totals.add_line(&line.amounts(supply)?)?;
    }
    Ok(totals)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: i64,
    pub paid_on: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    agency_id: Option<AgencyId>,
    number: String,
    client_id: Option<ClientId>,
    client_name: String,
    currency: CurrencyCode,
    seller_state: String,
    buyer_state: String,
    lines: Vec<InvoiceLine>,
    totals: InvoiceTotals,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    payments: Vec<Payment>,
    total_paid: i64,
    status: InvoiceStatus,
    notes: Option<String>,
    cancel_reason: Option<String>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            agency_id: None,
            number: String::new(),
            client_id: None,
            client_name: String::new(),
            currency: CurrencyCode::INR,
            seller_state: String::new(),
            buyer_state: String::new(),
            lines: Vec::new(),
            totals: InvoiceTotals::default(),
            issue_date: None,
            due_date: None,
            payments: Vec::new(),
            total_paid: 0,
            status: InvoiceStatus::Draft,
            notes: None,
            cancel_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn agency_id(&self) -> Option<AgencyId> {
        self.agency_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    pub fn supply_type(&self) -> SupplyType {
        SupplyType::between(&self.seller_state, &self.buyer_state)
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn total_paid(&self) -> i64 {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> i64 {
        self.totals.total.saturating_sub(self.total_paid).max(0)
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Invariant: only issued, unpaid invoices accept payment.
    pub fn can_accept_payment(&self) -> bool {
        matches!(
            self.status,
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid
        ) && self.outstanding_amount() > 0
    }

    pub fn effective_status(&self, today: NaiveDate) -> EffectiveStatus {
        match self.status {
            InvoiceStatus::Draft => EffectiveStatus::Draft,
            InvoiceStatus::Paid => EffectiveStatus::Paid,
            InvoiceStatus::Cancelled => EffectiveStatus::Cancelled,
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid
                if self.due_date.is_some_and(|due| today > due) =>
            {
                EffectiveStatus::Overdue
            }
            InvoiceStatus::Sent => EffectiveStatus::Sent,
            InvoiceStatus::PartiallyPaid => EffectiveStatus::PartiallyPaid,
        }
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateDraft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDraft {
    pub agency_id: AgencyId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub client_id: Option<ClientId>,
    pub client_name: String,
    pub currency: CurrencyCode,
    /// Seller's state code (GST registration).
    pub seller_state: String,
    /// Buyer's state code (place of supply).
    pub buyer_state: String,
    pub lines: Vec<InvoiceLine>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplaceLines (drafts only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceLines {
    pub agency_id: AgencyId,
    pub invoice_id: InvoiceId,
    pub lines: Vec<InvoiceLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub agency_id: AgencyId,
    pub invoice_id: InvoiceId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub agency_id: AgencyId,
    pub invoice_id: InvoiceId,
    /// Payment amount in minor currency units.
    pub amount: i64,
    pub paid_on: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub agency_id: AgencyId,
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateDraft(CreateDraft),
    ReplaceLines(ReplaceLines),
    Issue(IssueInvoice),
    RecordPayment(RecordPayment),
    Cancel(CancelInvoice),
}

/// Event: DraftCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCreated {
    pub draft: CreateDraft,
    pub totals: InvoiceTotals,
}

/// Event: LinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesReplaced {
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub payment: Payment,
    pub new_total_paid: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    DraftCreated(DraftCreated),
    LinesReplaced(LinesReplaced),
    Issued(IssueInvoice),
    PaymentRecorded(PaymentRecorded),
    Cancelled(CancelInvoice),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::DraftCreated(_) => "invoicing.invoice.draft_created",
            InvoiceEvent::LinesReplaced(_) => "invoicing.invoice.lines_replaced",
            InvoiceEvent::Issued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRecorded(_) => "invoicing.invoice.payment_recorded",
            InvoiceEvent::Cancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::DraftCreated(e) => e.draft.occurred_at,
            InvoiceEvent::LinesReplaced(e) => e.occurred_at,
            InvoiceEvent::Issued(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(e) => e.occurred_at,
            InvoiceEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::DraftCreated(e) => {
                let d = &e.draft;
                self.id = d.invoice_id;
                self.agency_id = Some(d.agency_id);
                self.number = d.number.clone();
                self.client_id = d.client_id;
                self.client_name = d.client_name.clone();
                self.currency = d.currency;
                self.seller_state = d.seller_state.clone();
                self.buyer_state = d.buyer_state.clone();
                self.lines = d.lines.clone();
                self.notes = d.notes.clone();
                self.totals = e.totals;
                self.status = InvoiceStatus::Draft;
                self.created = true;
            }
            InvoiceEvent::LinesReplaced(e) => {
                self.lines = e.lines.clone();
                self.totals = e.totals;
            }
            InvoiceEvent::Issued(e) => {
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
                self.status = InvoiceStatus::Sent;
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                self.total_paid = e.new_total_paid;
                self.status = if self.total_paid >= self.totals.total {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::PartiallyPaid
                };
            }
            InvoiceEvent::Cancelled(e) => {
                self.status = InvoiceStatus::Cancelled;
                self.cancel_reason = e.reason.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateDraft(cmd) => self.handle_create(cmd),
            InvoiceCommand::ReplaceLines(cmd) => self.handle_replace_lines(cmd),
            InvoiceCommand::Issue(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            InvoiceCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

fn validate_state_code(code: &str, what: &str) -> Result<(), DomainError> {
    let code = code.trim();
    if code.is_empty() || code.len() > 3 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::validation(format!("{what} state code is invalid")));
    }
    Ok(())
}

impl Invoice {
    fn ensure_existing(&self, agency_id: AgencyId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDraft) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        DomainError::require_text("invoice number", &cmd.number)?;
        DomainError::require_text("client name", &cmd.client_name)?;
        validate_state_code(&cmd.seller_state, "seller")?;
        validate_state_code(&cmd.buyer_state, "buyer")?;

        let supply = SupplyType::between(&cmd.seller_state, &cmd.buyer_state);
        let totals = compute_totals(&cmd.lines, supply)?;

        Ok(vec![InvoiceEvent::DraftCreated(DraftCreated {
            draft: cmd.clone(),
            totals,
        })])
    }

    fn handle_replace_lines(&self, cmd: &ReplaceLines) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.invoice_id)?;
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant("only draft invoices can be edited"));
        }
        let totals = compute_totals(&cmd.lines, self.supply_type())?;

        Ok(vec![InvoiceEvent::LinesReplaced(LinesReplaced {
            lines: cmd.lines.clone(),
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.invoice_id)?;
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invariant(format!(
                "invoice is already {}",
                self.status.as_str()
            )));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }
        if cmd.due_date < cmd.issue_date {
            return Err(DomainError::validation("due date is before issue date"));
        }

        Ok(vec![InvoiceEvent::Issued(cmd.clone())])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.invoice_id)?;

        if cmd.amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if !self.can_accept_payment() {
            return Err(DomainError::invariant(format!(
                "cannot record payment on a {} invoice",
                self.status.as_str()
            )));
        }
        if cmd.amount > self.outstanding_amount() {
            return Err(DomainError::invariant(
                "payment exceeds outstanding amount",
            ));
        }

        Ok(vec![InvoiceEvent::PaymentRecorded(PaymentRecorded {
            payment: Payment {
                amount: cmd.amount,
                paid_on: cmd.paid_on,
                method: cmd.method.clone(),
                reference: cmd.reference.clone(),
            },
            new_total_paid: self.total_paid + cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.invoice_id)?;

        if self.status == InvoiceStatus::Cancelled {
            return Ok(vec![]);
        }
        if self.total_paid > 0 {
            return Err(DomainError::invariant(
                "cannot cancel an invoice with recorded payments",
            ));
        }

        Ok(vec![InvoiceEvent::Cancelled(cmd.clone())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn design_line(price: i64) -> InvoiceLine {
        InvoiceLine {
            description: "Brand identity".into(),
            hsn_sac: Some("998391".into()),
            quantity_milli: 1000,
            unit_price: price,
            discount_bps: 0,
            gst_rate: GstRate::Eighteen,
        }
    }

    fn run(inv: &mut Invoice, cmd: InvoiceCommand) -> Result<Vec<InvoiceEvent>, DomainError> {
        inv.execute(&cmd)
    }

    fn draft(agency: AgencyId, buyer_state: &str, lines: Vec<InvoiceLine>) -> Invoice {
        let id = InvoiceId::new(RecordId::new());
        let mut inv = Invoice::empty(id);
        run(
            &mut inv,
            InvoiceCommand::CreateDraft(CreateDraft {
                agency_id: agency,
                invoice_id: id,
                number: "INV-2026-0001".into(),
                client_id: None,
                client_name: "Kite Labs".into(),
                currency: CurrencyCode::INR,
                seller_state: "KA".into(),
                buyer_state: buyer_state.into(),
                lines,
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        inv
    }

    fn issue(inv: &mut Invoice, agency: AgencyId, due: NaiveDate) -> Result<Vec<InvoiceEvent>, DomainError> {
        let id = inv.id_typed();
        run(
            inv,
            InvoiceCommand::Issue(IssueInvoice {
                agency_id: agency,
                invoice_id: id,
                issue_date: date(2026, 4, 1),
                due_date: due,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn pay(inv: &mut Invoice, agency: AgencyId, amount: i64) -> Result<Vec<InvoiceEvent>, DomainError> {
        let id = inv.id_typed();
        run(
            inv,
            InvoiceCommand::RecordPayment(RecordPayment {
                agency_id: agency,
                invoice_id: id,
                amount,
                paid_on: date(2026, 4, 10),
                method: Some("upi".into()),
                reference: None,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn intra_state_draft_uses_cgst_and_sgst() {
        let agency = AgencyId::new();
        let inv = draft(agency, "KA", vec![design_line(100_000)]);
        let t = inv.totals();
        assert_eq!(inv.supply_type(), SupplyType::IntraState);
        assert_eq!((t.subtotal, t.cgst, t.sgst, t.igst, t.total), (100_000, 9_000, 9_000, 0, 118_000));
        assert_eq!(inv.status(), InvoiceStatus::Draft);
    }

    #[test]
    fn inter_state_draft_uses_igst() {
        let agency = AgencyId::new();
        let inv = draft(agency, "MH", vec![design_line(100_000)]);
        assert_eq!(inv.totals().igst, 18_000);
        assert_eq!(inv.totals().cgst, 0);
    }

    #[test]
    fn empty_draft_cannot_be_issued() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![]);
        let err = issue(&mut inv, agency, date(2026, 4, 30)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn due_date_must_not_precede_issue_date() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![design_line(100)]);
        assert!(issue(&mut inv, agency, date(2026, 3, 31)).is_err());
        issue(&mut inv, agency, date(2026, 4, 1)).unwrap();
    }

    #[test]
    fn lines_are_frozen_after_issue() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![design_line(100)]);
        let id = inv.id_typed();
        let replace = InvoiceCommand::ReplaceLines(ReplaceLines {
            agency_id: agency,
            invoice_id: id,
            lines: vec![design_line(200)],
            occurred_at: Utc::now(),
        });
        run(&mut inv, replace.clone()).unwrap();
        assert_eq!(inv.totals().subtotal, 200);

        issue(&mut inv, agency, date(2026, 4, 30)).unwrap();
        assert!(run(&mut inv, replace).is_err());
    }

    #[test]
    fn payments_move_through_partial_to_paid() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![design_line(10_000)]);
        assert!(pay(&mut inv, agency, 100).is_err(), "draft accepts no payment");

        issue(&mut inv, agency, date(2026, 4, 30)).unwrap();
        pay(&mut inv, agency, 5_000).unwrap();
        assert_eq!(inv.status(), InvoiceStatus::PartiallyPaid);
        assert_eq!(inv.outstanding_amount(), 6_800);

        let err = pay(&mut inv, agency, 6_801).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        pay(&mut inv, agency, 6_800).unwrap();
        assert_eq!(inv.status(), InvoiceStatus::Paid);
        assert_eq!(inv.payments().len(), 2);
        assert!(pay(&mut inv, agency, 1).is_err());
    }

    #[test]
    fn paid_invoices_cannot_be_cancelled() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![design_line(1_000)]);
        issue(&mut inv, agency, date(2026, 4, 30)).unwrap();
        pay(&mut inv, agency, 10).unwrap();

        let id = inv.id_typed();
        let err = run(
            &mut inv,
            InvoiceCommand::Cancel(CancelInvoice {
                agency_id: agency,
                invoice_id: id,
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn overdue_is_derived_from_due_date() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![design_line(1_000)]);
        assert_eq!(inv.effective_status(date(2030, 1, 1)), EffectiveStatus::Draft);

        issue(&mut inv, agency, date(2026, 4, 30)).unwrap();
        assert_eq!(inv.effective_status(date(2026, 4, 30)), EffectiveStatus::Sent);
        assert_eq!(inv.effective_status(date(2026, 5, 1)), EffectiveStatus::Overdue);

        pay(&mut inv, agency, 1_180).unwrap();
        assert_eq!(inv.effective_status(date(2026, 5, 1)), EffectiveStatus::Paid);
    }

    #[test]
    fn other_agency_is_rejected() {
        let agency = AgencyId::new();
        let mut inv = draft(agency, "KA", vec![design_line(1_000)]);
        let err = issue(&mut inv, AgencyId::new(), date(2026, 4, 30)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
