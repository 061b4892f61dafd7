//! Test Data Builders
//!
//! Provides builder patterns for constructing requests with sensible
//! defaults, plus [`TestPortfolio`], which drives a [`LendingService`] over
//! the in-memory store so tests can set up whole portfolios in a few lines.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use core_kernel::{ActorId, BorrowerId, Clock, FixedClock, LoanId, MarketId, PaymentId, ScheduleId};
use domain_ledger::CashLedgerEntry;
use domain_lending::{
    Borrower, BorrowerRegistration, InMemoryLendingStore, LendingService, LendingStore,
    Loan, LoanApplication, Market, Payment, PaymentMethod, PaymentReceipt, PaymentRequest,
    RepaymentFrequency,
};

use crate::fixtures::{ActorFixtures, BorrowerFixtures, DateFixtures, MoneyFixtures};

/// Builder for loan applications
///
/// Defaults to the standard loan: 10000 at 10% over 10 days, repaid daily.
pub struct LoanApplicationBuilder {
    borrower_id: BorrowerId,
    principal: Decimal,
    interest_rate: Decimal,
    duration_days: u32,
    frequency: RepaymentFrequency,
    purpose: Option<String>,
}

impl LoanApplicationBuilder {
    /// Creates a new builder for the given borrower
    pub fn new(borrower_id: BorrowerId) -> Self {
        Self {
            borrower_id,
            principal: MoneyFixtures::principal(),
            interest_rate: MoneyFixtures::interest_rate(),
            duration_days: 10,
            frequency: RepaymentFrequency::Daily,
            purpose: None,
        }
    }

    pub fn with_principal(mut self, principal: Decimal) -> Self {
        self.principal = principal;
        self
    }

    /// Sets the flat rate, in percent of principal
    pub fn with_interest_rate(mut self, rate: Decimal) -> Self {
        self.interest_rate = rate;
        self
    }

    pub fn with_duration_days(mut self, days: u32) -> Self {
        self.duration_days = days;
        self
    }

    pub fn with_frequency(mut self, frequency: RepaymentFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn build(self) -> LoanApplication {
        LoanApplication {
            borrower_id: self.borrower_id,
            principal: self.principal,
            interest_rate: self.interest_rate,
            duration_days: self.duration_days,
            frequency: self.frequency,
            purpose: self.purpose,
        }
    }
}

/// Builder for payment capture requests
pub struct PaymentRequestBuilder {
    loan_id: LoanId,
    amount: Decimal,
    payment_date: NaiveDate,
    method: PaymentMethod,
    schedule_id: Option<ScheduleId>,
    notes: Option<String>,
}

impl PaymentRequestBuilder {
    /// Creates a cash payment dated on the opening day
    pub fn new(loan_id: LoanId, amount: Decimal) -> Self {
        Self {
            loan_id,
            amount,
            payment_date: DateFixtures::opening_day(),
            method: PaymentMethod::Cash,
            schedule_id: None,
            notes: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.payment_date = date;
        self
    }

    pub fn for_installment(mut self, schedule_id: ScheduleId) -> Self {
        self.schedule_id = Some(schedule_id);
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn build(self) -> PaymentRequest {
        PaymentRequest {
            loan_id: self.loan_id,
            amount: self.amount,
            payment_date: self.payment_date,
            method: self.method,
            schedule_id: self.schedule_id,
            notes: self.notes,
        }
    }
}

/// A lending service over a fresh in-memory store and a controllable clock
///
/// Helpers panic on failure; they are for arranging state, not for testing
/// the operations they call.
pub struct TestPortfolio {
    pub service: LendingService,
    pub store: Arc<InMemoryLendingStore>,
    pub clock: Arc<FixedClock>,
    pub officer: ActorId,
    borrowers: AtomicU32,
}

impl Default for TestPortfolio {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPortfolio {
    /// Creates a portfolio whose clock reads the opening day
    pub fn new() -> Self {
        Self::starting_on(DateFixtures::opening_day())
    }

    pub fn starting_on(date: NaiveDate) -> Self {
        let store = Arc::new(InMemoryLendingStore::new());
        let clock = Arc::new(FixedClock::at_date(date));
        let service = LendingService::new(store.clone(), clock.clone());
        Self {
            service,
            store,
            clock,
            officer: ActorFixtures::officer(),
            borrowers: AtomicU32::new(0),
        }
    }

    /// The store as the port the services consume
    pub fn port(&self) -> Arc<dyn LendingStore> {
        self.store.clone()
    }

    /// The clock as the services consume it
    pub fn clock_port(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub async fn market(&self, code: &str) -> Market {
        self.service
            .register_market(code, &format!("{code} Market"))
            .await
            .expect("Failed to register market")
    }

    /// Registers a borrower with a phone number unique to this portfolio
    pub async fn borrower(&self, market_id: MarketId) -> Borrower {
        let n = self.borrowers.fetch_add(1, Ordering::SeqCst) + 1;
        self.service
            .register_borrower(
                BorrowerRegistration {
                    market_id,
                    full_name: BorrowerFixtures::name(n),
                    phone: BorrowerFixtures::phone(n),
                    national_id: None,
                },
                self.officer,
            )
            .await
            .expect("Failed to register borrower")
    }

    /// A pending application for a new borrower in the market
    pub async fn application(
        &self,
        market_id: MarketId,
        configure: impl FnOnce(LoanApplicationBuilder) -> LoanApplicationBuilder,
    ) -> Loan {
        let borrower = self.borrower(market_id).await;
        let application = configure(LoanApplicationBuilder::new(borrower.id)).build();
        self.service
            .apply_loan(application, self.officer)
            .await
            .expect("Failed to apply for loan")
    }

    /// A loan applied for, approved and disbursed on `date`
    pub async fn disbursed_loan(
        &self,
        market_id: MarketId,
        date: NaiveDate,
        configure: impl FnOnce(LoanApplicationBuilder) -> LoanApplicationBuilder,
    ) -> Loan {
        let loan = self.application(market_id, configure).await;
        self.service
            .approve_loan(loan.id, ActorFixtures::supervisor())
            .await
            .expect("Failed to approve loan");
        self.service
            .disburse_loan(loan.id, date, self.officer)
            .await
            .expect("Failed to disburse loan")
    }

    /// The id of installment `number` (1-based) of a loan
    pub async fn installment(&self, loan_id: LoanId, number: u32) -> ScheduleId {
        self.store
            .schedules_for_loan(loan_id)
            .await
            .expect("Failed to load schedules")
            .into_iter()
            .find(|s| s.installment_number == number)
            .map(|s| s.id)
            .unwrap_or_else(|| panic!("loan {loan_id} has no installment {number}"))
    }

    /// Pays toward installment `number` of a loan
    pub async fn pay_installment(
        &self,
        loan_id: LoanId,
        number: u32,
        amount: Decimal,
        date: NaiveDate,
    ) -> PaymentReceipt {
        let schedule_id = self.installment(loan_id, number).await;
        let request = PaymentRequestBuilder::new(loan_id, amount)
            .on(date)
            .for_installment(schedule_id)
            .build();
        self.service
            .record_payment(request, self.officer)
            .await
            .expect("Failed to record payment")
    }

    /// Pays toward a loan without naming an installment
    pub async fn pay_unlinked(&self, loan_id: LoanId, amount: Decimal, date: NaiveDate) -> PaymentReceipt {
        let request = PaymentRequestBuilder::new(loan_id, amount).on(date).build();
        self.service
            .record_payment(request, self.officer)
            .await
            .expect("Failed to record payment")
    }

    pub async fn verify(&self, payment_id: PaymentId) -> Payment {
        self.service
            .verify_payment(payment_id, ActorFixtures::supervisor())
            .await
            .expect("Failed to verify payment")
    }

    pub async fn inject_capital(
        &self,
        amount: Decimal,
        date: NaiveDate,
        market_id: Option<MarketId>,
    ) -> CashLedgerEntry {
        self.service
            .record_capital_injection(amount, date, market_id, "Capital injection", self.officer)
            .await
            .expect("Failed to record capital injection")
    }

    pub async fn expense(&self, amount: Decimal, date: NaiveDate, market_id: Option<MarketId>) -> CashLedgerEntry {
        self.service
            .record_expense(amount, date, market_id, "Operating expense", self.officer)
            .await
            .expect("Failed to record expense")
    }
}
