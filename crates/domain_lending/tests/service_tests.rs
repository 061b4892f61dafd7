//! Service-level tests for domain_lending against the in-memory store

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{ActorId, Clock, FixedClock, MarketScope, Money};
use domain_ledger::TransactionType;
use domain_lending::{
    ActivityAction, BorrowerRegistration, InMemoryLendingStore, LendingError, LendingService,
    LendingStore, Loan, LoanApplication, LoanStatus, ObligationResolver, PaymentMethod,
    PaymentRequest, RepaymentFrequency, ScheduleStatus,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

struct Harness {
    service: Arc<LendingService>,
    store: Arc<InMemoryLendingStore>,
    clock: Arc<FixedClock>,
    officer: ActorId,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryLendingStore::new());
        let clock = Arc::new(FixedClock::at_date(start()));
        let service = Arc::new(LendingService::new(store.clone(), clock.clone()));
        Self {
            service,
            store,
            clock,
            officer: ActorId::new(),
        }
    }

    async fn disbursed_loan(&self, principal: Decimal, days: u32, frequency: RepaymentFrequency) -> Loan {
        let market = self.service.register_market("MKT", "Main Market").await.unwrap();
        let borrower = self
            .service
            .register_borrower(
                BorrowerRegistration {
                    market_id: market.id,
                    full_name: "Achieng Odhiambo".to_string(),
                    phone: "0722000111".to_string(),
                    national_id: None,
                },
                self.officer,
            )
            .await
            .unwrap();
        let loan = self
            .service
            .apply_loan(
                LoanApplication {
                    borrower_id: borrower.id,
                    principal,
                    interest_rate: dec!(10),
                    duration_days: days,
                    frequency,
                    purpose: None,
                },
                self.officer,
            )
            .await
            .unwrap();
        self.service.approve_loan(loan.id, ActorId::new()).await.unwrap();
        self.service.disburse_loan(loan.id, start(), self.officer).await.unwrap()
    }

    async fn pay(&self, loan: &Loan, installment: usize, amount: Decimal) -> Result<domain_lending::PaymentReceipt, LendingError> {
        let schedules = self.store.schedules_for_loan(loan.id).await.unwrap();
        self.service
            .record_payment(
                PaymentRequest {
                    loan_id: loan.id,
                    amount,
                    payment_date: self.clock.today(),
                    method: PaymentMethod::Cash,
                    schedule_id: Some(schedules[installment].id),
                    notes: None,
                },
                self.officer,
            )
            .await
    }
}

// ============================================================================
// Origination
// ============================================================================

mod origination {
    use super::*;

    #[tokio::test]
    async fn test_daily_loan_plan() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;

        assert_eq!(loan.status, LoanStatus::Disbursed);
        assert_eq!(loan.interest_amount.amount(), dec!(1000));
        assert_eq!(loan.total_amount.amount(), dec!(11000));
        assert_eq!(loan.due_date, start().checked_add_days(Days::new(10)));

        let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
        assert_eq!(schedules.len(), 10);
        for (i, s) in schedules.iter().enumerate() {
            assert_eq!(s.installment_number as usize, i + 1);
            assert_eq!(s.expected_amount.amount(), dec!(1100));
            assert_eq!(s.due_date, start().checked_add_days(Days::new(i as u64 + 1)).unwrap());
        }
    }

    #[tokio::test]
    async fn test_disbursement_writes_negative_ledger_entry() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(5000), 30, RepaymentFrequency::Weekly).await;

        let snapshot = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();
        assert_eq!(snapshot.ledger.len(), 1);
        let entry = &snapshot.ledger[0];
        assert_eq!(entry.transaction_type, TransactionType::Disbursement);
        assert_eq!(entry.amount.amount(), dec!(-5000));
        assert_eq!(entry.loan_id, Some(loan.id));
        assert_eq!(entry.market_id, Some(loan.market_id));
    }

    #[tokio::test]
    async fn test_disburse_twice_is_rejected() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;

        let result = h.service.disburse_loan(loan.id, start(), h.officer).await;
        assert!(matches!(result, Err(LendingError::InvalidStateTransition { .. })));
        assert_eq!(h.store.schedules_for_loan(loan.id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_every_transition_is_audited() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;

        let actions: Vec<ActivityAction> = h
            .service
            .loan_activities(loan.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(
            actions,
            vec![ActivityAction::Applied, ActivityAction::Approved, ActivityAction::Disbursed]
        );
    }

    #[tokio::test]
    async fn test_unknown_borrower_is_not_found() {
        let h = Harness::new();
        let result = h
            .service
            .apply_loan(
                LoanApplication {
                    borrower_id: core_kernel::BorrowerId::new(),
                    principal: dec!(100),
                    interest_rate: dec!(5),
                    duration_days: 7,
                    frequency: RepaymentFrequency::Daily,
                    purpose: None,
                },
                h.officer,
            )
            .await;
        assert!(matches!(result, Err(LendingError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_unsplittable_or_oversized_applications_are_rejected() {
        let h = Harness::new();
        let market = h.service.register_market("SML", "Small Market").await.unwrap();
        let borrower = h
            .service
            .register_borrower(
                BorrowerRegistration {
                    market_id: market.id,
                    full_name: "Njeri Mwangi".to_string(),
                    phone: "0700111222".to_string(),
                    national_id: None,
                },
                h.officer,
            )
            .await
            .unwrap();
        let application = |principal: Decimal, interest_rate: Decimal, duration_days: u32| LoanApplication {
            borrower_id: borrower.id,
            principal,
            interest_rate,
            duration_days,
            frequency: RepaymentFrequency::Daily,
            purpose: None,
        };

        let tiny = h.service.apply_loan(application(dec!(1.00), dec!(0), 150), h.officer).await;
        assert!(matches!(tiny, Err(LendingError::Validation(_))));

        let huge = h
            .service
            .apply_loan(application(dec!(70000000000000000000000000000), dec!(500), 10), h.officer)
            .await;
        assert!(matches!(huge, Err(LendingError::Validation(_))));

        let snapshot = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();
        assert!(snapshot.loans.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_phone_is_rejected() {
        let h = Harness::new();
        let market = h.service.register_market("DUP", "Dup Market").await.unwrap();
        let registration = BorrowerRegistration {
            market_id: market.id,
            full_name: "Kiprop".to_string(),
            phone: "0733 000 222".to_string(),
            national_id: None,
        };
        h.service.register_borrower(registration.clone(), h.officer).await.unwrap();
        let result = h.service.register_borrower(registration, h.officer).await;
        assert!(matches!(result, Err(LendingError::Validation(_))));
    }
}

// ============================================================================
// Repayment
// ============================================================================

mod repayment {
    use super::*;

    #[tokio::test]
    async fn test_first_installment_paid_loan_still_open() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;

        let receipt = h.pay(&loan, 0, dec!(1100)).await.unwrap();
        assert_eq!(receipt.loan.status, LoanStatus::Active);
        assert_eq!(receipt.payment.receipt_number.to_string(), "RCP-20240101-0001");
        assert_eq!(receipt.ledger_entry.amount.amount(), dec!(1100));
        assert_eq!(receipt.ledger_entry.payment_id, Some(receipt.payment.id));

        let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
        let payments = h.store.payments_for_loan(loan.id).await.unwrap();
        let resolver = ObligationResolver::new(&payments);
        assert!(resolver.is_paid(&schedules[0]));
        assert_eq!(schedules[0].status, ScheduleStatus::Paid);
        assert_eq!(schedules.iter().filter(|s| s.status == ScheduleStatus::Pending).count(), 9);
        assert!(!resolver.loan_is_complete(&schedules));
    }

    #[tokio::test]
    async fn test_paying_every_installment_completes_loan() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;

        for i in 0..10 {
            h.clock.advance_days(1);
            h.pay(&loan, i, dec!(1100)).await.unwrap();
        }

        let loan = h.store.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Completed);
        assert!(loan.completed_at.is_some());

        let completed = h
            .store
            .activities_for_loan(loan.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.action == ActivityAction::Completed)
            .count();
        assert_eq!(completed, 1);

        let result = h.pay(&loan, 0, dec!(1)).await;
        assert!(matches!(result, Err(LendingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_partial_payment_keeps_installment_open() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;

        h.clock.advance_days(6);
        h.pay(&loan, 0, dec!(200)).await.unwrap();

        let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
        assert_eq!(schedules[0].status, ScheduleStatus::Overdue);
    }

    #[tokio::test]
    async fn test_installment_of_other_loan_is_rejected_without_side_effects() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;
        let before = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();

        let result = h
            .service
            .record_payment(
                PaymentRequest {
                    loan_id: loan.id,
                    amount: dec!(100),
                    payment_date: start(),
                    method: PaymentMethod::MobileMoney,
                    schedule_id: Some(core_kernel::ScheduleId::new()),
                    notes: None,
                },
                h.officer,
            )
            .await;
        assert!(matches!(result, Err(LendingError::Validation(_))));

        let after = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();
        assert_eq!(before.ledger.len(), after.ledger.len());
        assert!(after.payments.is_empty());
        assert_eq!(h.store.get_loan(loan.id).await.unwrap().status, LoanStatus::Disbursed);
    }

    #[tokio::test]
    async fn test_unlinked_payment_counts_but_settles_nothing() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;

        let receipt = h
            .service
            .record_payment(
                PaymentRequest {
                    loan_id: loan.id,
                    amount: dec!(500),
                    payment_date: start(),
                    method: PaymentMethod::Cash,
                    schedule_id: None,
                    notes: Some("walk-in".to_string()),
                },
                h.officer,
            )
            .await
            .unwrap();

        assert_eq!(receipt.loan.status, LoanStatus::Active);
        let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
        assert!(schedules.iter().all(|s| s.status == ScheduleStatus::Pending));
    }

    #[tokio::test]
    async fn test_concurrent_payments_are_serialized() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;
        let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();

        let mut handles = Vec::new();
        for schedule in schedules.iter().cloned() {
            let service = h.service.clone();
            let officer = h.officer;
            handles.push(tokio::spawn(async move {
                service
                    .record_payment(
                        PaymentRequest {
                            loan_id: schedule.loan_id,
                            amount: schedule.expected_amount.amount(),
                            payment_date: start(),
                            method: PaymentMethod::Cash,
                            schedule_id: Some(schedule.id),
                            notes: None,
                        },
                        officer,
                    )
                    .await
            }));
        }
        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap().unwrap().payment.receipt_number.to_string());
        }
        receipts.sort();
        receipts.dedup();
        assert_eq!(receipts.len(), 10);

        let loan = h.store.get_loan(loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Completed);
        let completed = h
            .store
            .activities_for_loan(loan.id)
            .await
            .unwrap()
            .iter()
            .filter(|a| a.action == ActivityAction::Completed)
            .count();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn test_verification_is_recorded_once() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;
        let receipt = h.pay(&loan, 0, dec!(110)).await.unwrap();

        let verified = h.service.verify_payment(receipt.payment.id, ActorId::new()).await.unwrap();
        assert!(verified.is_verified);
        let again = h.service.verify_payment(receipt.payment.id, ActorId::new()).await;
        assert!(matches!(again, Err(LendingError::ConcurrencyConflict(_))));

        let stale = receipt.payment.clone();
        let activity = domain_lending::LoanActivity::new(
            loan.id,
            h.officer,
            ActivityAction::PaymentVerified,
            "again",
            h.clock.now(),
        );
        let raced = h.store.commit_payment_verification(stale, activity).await;
        assert!(matches!(
            raced.map_err(LendingError::from),
            Err(LendingError::ConcurrencyConflict(_))
        ));
    }
}

// ============================================================================
// Closure and maintenance
// ============================================================================

mod closure {
    use super::*;

    #[tokio::test]
    async fn test_default_and_write_off_paths() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;

        let result = h.service.mark_defaulted(loan.id, h.officer, "stopped trading").await;
        assert!(matches!(result, Err(LendingError::InvalidStateTransition { .. })));

        h.pay(&loan, 0, dec!(110)).await.unwrap();
        let loan = h.service.mark_defaulted(loan.id, h.officer, "stopped trading").await.unwrap();
        assert_eq!(loan.status, LoanStatus::Defaulted);
        assert!(h.service.write_off(loan.id, h.officer, "uncollectable").await.is_err());
    }

    #[tokio::test]
    async fn test_soft_removed_application_disappears_from_reports() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(1000), 7, RepaymentFrequency::Daily).await;
        let borrower = h.store.get_borrower(loan.borrower_id).await.unwrap();

        let pending = h
            .service
            .apply_loan(
                LoanApplication {
                    borrower_id: borrower.id,
                    principal: dec!(300),
                    interest_rate: dec!(10),
                    duration_days: 14,
                    frequency: RepaymentFrequency::Weekly,
                    purpose: None,
                },
                h.officer,
            )
            .await
            .unwrap();
        assert_eq!(pending.loan_number.sequence(), 2);

        h.service.reject_loan(pending.id, h.officer, "incomplete documents").await.unwrap();
        let removed = h.service.soft_remove_loan(pending.id, h.officer).await.unwrap();
        assert!(removed.is_removed());

        let snapshot = h.store.portfolio_snapshot(MarketScope::All).await.unwrap();
        assert_eq!(snapshot.loans.len(), 1);
        assert!(h.service.approve_loan(pending.id, h.officer).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_marks_missed_installments_overdue() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;

        h.clock.advance_days(4);
        let changed = h.service.refresh_overdue(MarketScope::All).await.unwrap();
        assert_eq!(changed, 3);

        let schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
        let overdue: Vec<u32> = schedules
            .iter()
            .filter(|s| s.status == ScheduleStatus::Overdue)
            .map(|s| s.installment_number)
            .collect();
        assert_eq!(overdue, vec![1, 2, 3]);

        assert_eq!(h.service.refresh_overdue(MarketScope::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_refresh_cannot_undo_a_payment() {
        let h = Harness::new();
        let loan = h.disbursed_loan(dec!(10000), 10, RepaymentFrequency::Daily).await;
        h.clock.advance_days(2);

        // A refresh that read the loan before the payment below landed
        let stale_loan = h.store.get_loan(loan.id).await.unwrap();
        let mut schedules = h.store.schedules_for_loan(loan.id).await.unwrap();
        let payments = h.store.payments_for_loan(loan.id).await.unwrap();
        let changed = ObligationResolver::new(&payments).refresh_statuses(
            &mut schedules,
            h.clock.today(),
            h.clock.now(),
        );
        assert_eq!(changed[0].status, ScheduleStatus::Overdue);

        h.pay(&loan, 0, dec!(1100)).await.unwrap();

        let result = h.store.update_schedule_statuses(stale_loan, changed).await;
        assert!(matches!(
            result.map_err(LendingError::from),
            Err(LendingError::ConcurrencyConflict(_))
        ));
        let stored = h.store.schedules_for_loan(loan.id).await.unwrap();
        assert_eq!(stored[0].status, ScheduleStatus::Paid);

        h.clock.advance_days(1);
        assert_eq!(h.service.refresh_overdue(MarketScope::All).await.unwrap(), 1);
        let stored = h.store.schedules_for_loan(loan.id).await.unwrap();
        assert_eq!(stored[0].status, ScheduleStatus::Paid);
        assert_eq!(stored[1].status, ScheduleStatus::Overdue);
    }

    #[tokio::test]
    async fn test_cash_movements() {
        let h = Harness::new();
        let capital = h
            .service
            .record_capital_injection(dec!(5000), start(), None, "Owner capital", h.officer)
            .await
            .unwrap();
        assert_eq!(capital.amount, Money::new(dec!(5000)));

        let expense = h
            .service
            .record_expense(dec!(120), start(), None, "Receipt books", h.officer)
            .await
            .unwrap();
        assert_eq!(expense.amount.amount(), dec!(-120));
        assert_eq!(expense.reference_number.to_string(), "CSH-20240101-0002");

        let invalid = h
            .service
            .record_expense(dec!(0), start(), None, "Nothing", h.officer)
            .await;
        assert!(matches!(invalid, Err(LendingError::Validation(_))));

        let unknown_market = h
            .service
            .record_expense(dec!(10), start(), Some(core_kernel::MarketId::new()), "Fuel", h.officer)
            .await;
        assert!(matches!(unknown_market, Err(LendingError::NotFound { .. })));
    }
}
