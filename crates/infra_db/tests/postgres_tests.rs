//! PostgreSQL adapter tests
//!
//! Each test starts its own container, so these need Docker:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{ActorId, AdapterHealth, Clock, FixedClock, HealthCheckable, MarketScope, PortError};
use domain_lending::{
    ActivityAction, BorrowerRegistration, LendingError, LendingService, LendingStore, Loan, LoanActivity, LoanStatus,
    ScheduleStatus,
};
use domain_reporting::ReportingService;
use infra_db::PostgresLendingStore;
use test_utils::{
    assert_money_eq, ActorFixtures, BorrowerFixtures, DateFixtures, LoanApplicationBuilder,
    PaymentRequestBuilder, TestDatabase,
};

struct PgHarness {
    _db: TestDatabase,
    store: Arc<PostgresLendingStore>,
    clock: Arc<FixedClock>,
    service: LendingService,
    officer: ActorId,
}

impl PgHarness {
    async fn start() -> Self {
        let db = TestDatabase::start().await.expect("Failed to start PostgreSQL");
        let store = Arc::new(PostgresLendingStore::new(db.pool().clone()));
        let clock = Arc::new(FixedClock::at_date(DateFixtures::opening_day()));
        let service = LendingService::new(store.clone(), clock.clone());
        Self {
            _db: db,
            store,
            clock,
            service,
            officer: ActorFixtures::officer(),
        }
    }

    fn reporting(&self) -> ReportingService {
        ReportingService::new(self.store.clone(), self.clock.clone())
    }

    async fn application(&self, market_code: &str, n: u32) -> Loan {
        let market = self
            .service
            .register_market(market_code, "Test Market")
            .await
            .expect("Failed to register market");
        let borrower = self
            .service
            .register_borrower(
                BorrowerRegistration {
                    market_id: market.id,
                    full_name: BorrowerFixtures::name(n),
                    phone: BorrowerFixtures::phone(n),
                    national_id: None,
                },
                self.officer,
            )
            .await
            .expect("Failed to register borrower");
        self.service
            .apply_loan(LoanApplicationBuilder::new(borrower.id).build(), self.officer)
            .await
            .expect("Failed to apply")
    }

    async fn disbursed(&self, market_code: &str, n: u32) -> Loan {
        let loan = self.application(market_code, n).await;
        self.service
            .approve_loan(loan.id, ActorFixtures::supervisor())
            .await
            .expect("Failed to approve");
        self.service
            .disburse_loan(loan.id, DateFixtures::opening_day(), self.officer)
            .await
            .expect("Failed to disburse")
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_health_check_reports_healthy() {
    let h = PgHarness::start().await;
    let result = h.store.health_check().await;

    assert_eq!(result.status, AdapterHealth::Healthy);
    assert_eq!(result.adapter_id, "postgres-lending-store");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_loan_numbers_are_sequential_per_day() {
    let h = PgHarness::start().await;
    let first = h.application("CBD", 1).await;
    let second = h.application("GIK", 2).await;

    assert_eq!(first.loan_number.to_string(), "LN-20240101-0001");
    assert_eq!(second.loan_number.to_string(), "LN-20240101-0002");
    assert_eq!(first.version, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_phone_in_market_is_rejected() {
    let h = PgHarness::start().await;
    let market = h.service.register_market("CBD", "City").await.unwrap();
    let registration = BorrowerRegistration {
        market_id: market.id,
        full_name: "Wanjiru Kamau".to_string(),
        phone: "0711222333".to_string(),
        national_id: None,
    };

    h.service.register_borrower(registration.clone(), h.officer).await.unwrap();
    let result = h.service.register_borrower(registration, h.officer).await;

    match result {
        Err(LendingError::Validation(message)) => assert!(message.starts_with("phone")),
        other => panic!("expected a phone validation error, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_market_code_is_rejected() {
    let h = PgHarness::start().await;
    h.service.register_market("CBD", "City").await.unwrap();

    let result = h.service.register_market("CBD", "Another").await;
    assert!(matches!(result, Err(LendingError::Validation(_))));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stale_loan_version_is_rejected() {
    let h = PgHarness::start().await;
    let loan = h.application("CBD", 1).await;
    let actor = ActorFixtures::supervisor();

    let mut first = loan.clone();
    let activity = first.approve(actor, h.clock.now()).unwrap();
    let stored = h.store.commit_transition(first, activity).await.unwrap();
    assert_eq!(stored.version, 2);

    let mut stale = loan.clone();
    let activity = stale.reject(actor, "duplicate", h.clock.now()).unwrap();
    let result = h.store.commit_transition(stale, activity).await;

    assert!(matches!(result, Err(PortError::Conflict { .. })));
    assert_eq!(h.store.get_loan(loan.id).await.unwrap().status, LoanStatus::Approved);
    assert_eq!(h.store.activities_for_loan(loan.id).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_disbursement_writes_schedule_and_ledger() {
    let h = PgHarness::start().await;
    let loan = h.disbursed("CBD", 1).await;

    let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
    assert_eq!(schedules.len(), 10);
    assert!(schedules.windows(2).all(|w| w[0].installment_number < w[1].installment_number));
    assert_eq!(loan.status, LoanStatus::Disbursed);

    let snapshot = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();
    assert_eq!(snapshot.ledger.len(), 1);
    assert_money_eq(snapshot.ledger[0].amount, dec!(-10000));
    assert_eq!(snapshot.ledger[0].reference_number.to_string(), "CSH-20240101-0001");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_payment_flow_feeds_reports() {
    let h = PgHarness::start().await;
    h.service
        .record_capital_injection(dec!(20000), DateFixtures::opening_day(), None, "Owner float", h.officer)
        .await
        .unwrap();
    let loan = h.disbursed("CBD", 1).await;
    let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();

    let day = DateFixtures::day(1);
    h.clock.advance_days(1);
    let receipt = h
        .service
        .record_payment(
            PaymentRequestBuilder::new(loan.id, dec!(1100))
                .on(day)
                .for_installment(schedules[0].id)
                .build(),
            h.officer,
        )
        .await
        .unwrap();

    assert_eq!(receipt.payment.receipt_number.to_string(), "RCP-20240102-0001");
    assert_eq!(receipt.loan.status, LoanStatus::Active);
    let stored = h.store.schedules_for_loan(loan.id).await.unwrap();
    assert_eq!(stored[0].status, ScheduleStatus::Paid);

    let reporting = h.reporting();
    let cash = reporting.cash_in_hand(Some(day), MarketScope::All).await.unwrap();
    assert_money_eq(cash.amount, dec!(11100));

    let balance = reporting.loan_balance(loan.id).await.unwrap();
    assert_money_eq(balance.total_paid, dec!(1100));
    assert_money_eq(balance.outstanding, dec!(9900));
    assert_eq!(balance.installments_paid, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_second_verification_conflicts() {
    let h = PgHarness::start().await;
    let loan = h.disbursed("CBD", 1).await;
    let receipt = h
        .service
        .record_payment(PaymentRequestBuilder::new(loan.id, dec!(500)).build(), h.officer)
        .await
        .unwrap();

    let verified = h.service.verify_payment(receipt.payment.id, h.officer).await.unwrap();
    assert!(verified.is_verified);

    let stale = receipt.payment.clone();
    let activity = LoanActivity::new(
        loan.id,
        h.officer,
        ActivityAction::PaymentVerified,
        "again",
        h.clock.now(),
    );
    let result = h.store.commit_payment_verification(stale, activity).await;
    assert!(matches!(result, Err(PortError::Conflict { .. })));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_status_refresh_from_stale_loan_conflicts() {
    let h = PgHarness::start().await;
    let loan = h.disbursed("CBD", 1).await;
    h.clock.advance_days(2);

    let stale_loan = h.store.get_loan(loan.id).await.unwrap();
    let mut schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
    schedules[0].status = ScheduleStatus::Overdue;
    let changed = vec![schedules[0].clone()];

    h.service
        .record_payment(
            PaymentRequestBuilder::new(loan.id, dec!(1100))
                .on(h.clock.today())
                .for_installment(schedules[0].id)
                .build(),
            h.officer,
        )
        .await
        .unwrap();

    let result = h.store.update_schedule_statuses(stale_loan, changed).await;
    assert!(matches!(result, Err(PortError::Conflict { .. })));
    let stored = h.store.schedules_for_loan(loan.id).await.unwrap();
    assert_eq!(stored[0].status, ScheduleStatus::Paid);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_snapshot_respects_scope_and_removal() {
    let h = PgHarness::start().await;
    let kept = h.disbursed("CBD", 1).await;
    let other = h.disbursed("GIK", 2).await;
    let removed = h.application("MTW", 3).await;
    h.service.soft_remove_loan(removed.id, h.officer).await.unwrap();

    let all = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();
    assert_eq!(all.loans.len(), 2);
    assert_eq!(all.schedules.len(), 20);

    let scoped = h
        .store
        .portfolio_snapshot(MarketScope::Market(kept.market_id))
        .await
        .unwrap();
    assert_eq!(scoped.loans.len(), 1);
    assert_eq!(scoped.loans[0].id, kept.id);
    assert!(scoped.schedules.iter().all(|s| s.loan_id == kept.id));
    assert!(scoped.ledger.iter().all(|e| e.market_id == Some(kept.market_id)));
    assert_ne!(kept.market_id, other.market_id);

    let open = h.store.open_loans(MarketScope::All).await.unwrap();
    assert_eq!(open.len(), 2);
}
