use agencyhub_accounting::{
    trial_balance, Account, AccountKind, DraftJournalEntry, JournalCommand, JournalEntry,
    JournalEntryId, JournalLine, PostJournalEntry,
};
use agencyhub_core::{AgencyId, Aggregate, CurrencyCode, Money, RecordId};
use chrono::{NaiveDate, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn account(code: &str, kind: AccountKind) -> Account {
    Account {
        code: code.to_string(),
        name: code.to_string(),
        kind,
    }
}

fn posted_entries(agency: AgencyId, n: usize) -> Vec<JournalEntry> {
    let date = NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date");
    (0..n)
        .map(|i| {
            let id = JournalEntryId::new(RecordId::new());
            let amount = Money::new(100 + i as i64, CurrencyCode::INR);
            let mut entry = JournalEntry::empty(id);
            let cmds = [
                JournalCommand::Draft(DraftJournalEntry {
                    agency_id: agency,
                    entry_id: id,
                    number: format!("JV-{i}"),
                    date,
                    narration: None,
                    lines: vec![
                        JournalLine {
                            account: account(&format!("13{:02}", i % 50), AccountKind::Asset),
                            amount,
                            is_debit: true,
                            memo: None,
                        },
                        JournalLine {
                            account: account("4100", AccountKind::Revenue),
                            amount,
                            is_debit: false,
                            memo: None,
                        },
                    ],
                    reversal_of: None,
                    occurred_at: Utc::now(),
                }),
                JournalCommand::Post(PostJournalEntry {
                    agency_id: agency,
                    entry_id: id,
                    occurred_at: Utc::now(),
                }),
            ];
            for cmd in &cmds {
                entry.execute(cmd).expect("bench entry is valid");
            }
            entry
        })
        .collect()
}

fn bench_trial_balance(c: &mut Criterion) {
    let agency = AgencyId::new();
    let entries = posted_entries(agency, 10_000);

    c.bench_function("trial_balance_10k_entries", |b| {
        b.iter(|| {
            let tb = trial_balance(black_box(&entries), CurrencyCode::INR);
            black_box(tb.is_balanced())
        })
    });
}

criterion_group!(benches, bench_trial_balance);
criterion_main!(benches);
