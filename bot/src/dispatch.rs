use std::sync::Arc;

use starfall_engine::ledger::Ledger;
use starfall_engine::payment::Correlator;
use starfall_engine::referral::{Referrals, VisitOutcome};
use starfall_engine::session::{Coordinator, Funding, SessionReport, SessionRequest, ThrowEmitter};
use starfall_engine::store::Store;
use starfall_engine::Error;
use starfall_types::{
    AccountId, AdminCommand, Command, ConversationId, Event, Tier, ERROR_BANNED, ERROR_BUSY,
    ERROR_COOLDOWN_ACTIVE, ERROR_DUPLICATE_TOKEN, ERROR_INSUFFICIENT_BALANCE,
    ERROR_INVALID_REQUEST, ERROR_INVALID_TOKEN, ERROR_STORAGE, MAX_THROWS,
};
use tracing::error;

/// Maps boundary commands onto engine calls and engine results onto events.
///
/// Commands arrive already decoded; nothing here parses strings. Every arm
/// returns the full list of events the presentation layer should render.
pub struct Dispatcher<S: Store, E: ThrowEmitter> {
    ledger: Ledger<S>,
    referrals: Referrals<S>,
    correlator: Correlator<S>,
    coordinator: Arc<Coordinator<S, E>>,
}

impl<S: Store, E: ThrowEmitter> Dispatcher<S, E> {
    pub fn new(
        ledger: Ledger<S>,
        referrals: Referrals<S>,
        correlator: Correlator<S>,
        coordinator: Arc<Coordinator<S, E>>,
    ) -> Self {
        Self {
            ledger,
            referrals,
            correlator,
            coordinator,
        }
    }

    pub async fn dispatch(&self, command: Command) -> Vec<Event> {
        match command {
            Command::Throw {
                conversation,
                account,
                throws,
                tier,
            } => {
                if throws == 0 || throws > MAX_THROWS {
                    return vec![Event::Error {
                        account: Some(account),
                        code: ERROR_INVALID_REQUEST,
                        message: format!("throw count must be between 1 and {MAX_THROWS}"),
                    }];
                }
                self.run_session(conversation, account, throws, tier, Funding::Balance)
                    .await
            }
            Command::FreeThrow {
                conversation,
                account,
            } => {
                self.run_session(conversation, account, 1, Tier::Ordinary, Funding::Free)
                    .await
            }
            Command::ReferralVisit { referred, inviter } => {
                self.referral_visit(referred, inviter).await
            }
            Command::Balance { account } => self.balance(account).await,
            Command::PreCheckout { id } => {
                // Collaborator contract: pre-authorizations are always accepted.
                vec![Event::PreCheckoutAccepted { id }]
            }
            Command::PaymentConfirmed {
                conversation,
                token,
                paid_amount,
            } => self.payment_confirmed(conversation, &token, paid_amount).await,
            Command::Admin(admin) => self.admin(admin).await,
        }
    }

    async fn run_session(
        &self,
        conversation: ConversationId,
        account: AccountId,
        throws: u8,
        tier: Tier,
        funding: Funding,
    ) -> Vec<Event> {
        let request = SessionRequest {
            conversation,
            account,
            throws,
            tier,
            funding,
        };
        match self.coordinator.run(request).await {
            Ok(report) => session_events(conversation, account, tier, report),
            // Balance short: defer the session behind a payment request
            // instead of failing it.
            Err(Error::InsufficientBalance { .. }) if matches!(funding, Funding::Balance) => {
                let (token, amount) = self.correlator.issue(account, throws, tier);
                vec![Event::PaymentRequested {
                    account,
                    token,
                    amount,
                }]
            }
            Err(err) => vec![error_event(Some(account), err)],
        }
    }

    async fn payment_confirmed(
        &self,
        conversation: ConversationId,
        token: &str,
        paid_amount: u64,
    ) -> Vec<Event> {
        let resumption = match self.correlator.redeem(token, paid_amount).await {
            Ok(resumption) => resumption,
            Err(err) => return vec![error_event(None, err)],
        };
        self.run_session(
            conversation,
            resumption.account,
            resumption.throws,
            resumption.tier,
            Funding::Paid {
                amount: resumption.paid_amount,
            },
        )
        .await
    }

    async fn referral_visit(&self, referred: AccountId, inviter: AccountId) -> Vec<Event> {
        match self.referrals.register_visit(referred, inviter).await {
            Ok(VisitOutcome::Registered) => vec![Event::ReferralRegistered { referred, inviter }],
            Ok(VisitOutcome::AlreadyLinked) => vec![Event::Error {
                account: Some(referred),
                code: ERROR_INVALID_REQUEST,
                message: "referral already registered".to_string(),
            }],
            Ok(VisitOutcome::SelfReferral) => vec![Event::Error {
                account: Some(referred),
                code: ERROR_INVALID_REQUEST,
                message: "cannot refer yourself".to_string(),
            }],
            Err(err) => vec![error_event(Some(referred), err)],
        }
    }

    async fn balance(&self, account: AccountId) -> Vec<Event> {
        match self.ledger.ensure_account(account).await {
            Ok(row) => vec![Event::AccountBalance {
                account,
                balance: row.virtual_balance,
            }],
            Err(err) => vec![error_event(Some(account), err)],
        }
    }

    async fn admin(&self, command: AdminCommand) -> Vec<Event> {
        let result = match command {
            AdminCommand::ShowBalance { account } => return self.balance(account).await,
            AdminCommand::SetBalance { account, value } => {
                self.set_balance(account, value).await
            }
            AdminCommand::Stats => self.stats().await,
            AdminCommand::Ban { account } => self.set_banned(account, true).await,
            AdminCommand::Unban { account } => self.set_banned(account, false).await,
            AdminCommand::TopUpPool { amount } => self.top_up_pool(amount).await,
        };
        result.unwrap_or_else(|err| vec![error_event(None, err)])
    }

    async fn set_balance(&self, account: AccountId, value: u64) -> Result<Vec<Event>, Error> {
        self.ledger.ensure_account(account).await?;
        self.ledger.set_balance(account, value).await?;
        Ok(vec![Event::AccountBalance {
            account,
            balance: value,
        }])
    }

    async fn stats(&self) -> Result<Vec<Event>, Error> {
        let accounts = self.ledger.count_accounts().await?;
        let pool = self.ledger.pool_balance().await?;
        Ok(vec![Event::Stats { accounts, pool }])
    }

    async fn set_banned(&self, account: AccountId, banned: bool) -> Result<Vec<Event>, Error> {
        self.ledger.ensure_account(account).await?;
        self.ledger.set_banned(account, banned).await?;
        let verb = if banned { "banned" } else { "unbanned" };
        Ok(vec![Event::AdminAck {
            detail: format!("account {account} {verb}"),
        }])
    }

    async fn top_up_pool(&self, amount: u64) -> Result<Vec<Event>, Error> {
        let pool = self.ledger.pool_credit(amount as i64).await?;
        Ok(vec![Event::AdminAck {
            detail: format!("pool balance {pool}"),
        }])
    }
}

/// Expand a finished session into presentation events.
fn session_events(
    conversation: ConversationId,
    account: AccountId,
    tier: Tier,
    report: SessionReport,
) -> Vec<Event> {
    let mut events = Vec::new();
    if let Some((amount, balance)) = report.debited {
        events.push(Event::DebitConfirmed {
            account,
            amount,
            balance,
        });
    }
    events.push(Event::SessionResolved {
        conversation,
        account,
        tier,
        throws: report.throws,
        outcome: report.outcome,
        reward_amount: report.reward.as_ref().map(|task| task.amount),
    });
    if let Some(task) = report.reward {
        events.push(Event::RewardQueued {
            task_id: task.id,
            beneficiary: task.beneficiary_id,
            amount: task.amount,
            tier: task.tier,
        });
    }
    if let Some(credit) = report.referral_credit {
        events.push(Event::ReferralCredited {
            inviter: credit.inviter,
            bonus: credit.bonus,
        });
    }
    events
}

fn error_event(account: Option<AccountId>, err: Error) -> Event {
    let code = match &err {
        Error::Busy => ERROR_BUSY,
        Error::CooldownActive { .. } => ERROR_COOLDOWN_ACTIVE,
        Error::InsufficientBalance { .. } => ERROR_INSUFFICIENT_BALANCE,
        Error::Banned(_) => ERROR_BANNED,
        Error::InvalidToken(_) => ERROR_INVALID_TOKEN,
        Error::DuplicateToken => ERROR_DUPLICATE_TOKEN,
        Error::Storage(_) => {
            error!(error = %err, "storage error reached the dispatch boundary");
            ERROR_STORAGE
        }
    };
    Event::Error {
        account,
        code,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::registry::Registry;
    use starfall_engine::mocks::ScriptedEmitter;
    use starfall_engine::queue::Queue;
    use starfall_engine::store::MemStore;
    use starfall_types::{Outcome, PaymentToken, TaskStatus};

    fn dispatcher(emitter: ScriptedEmitter) -> (Dispatcher<MemStore, ScriptedEmitter>, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let ledger = Ledger::new(store.clone());
        let referrals = Referrals::new(store.clone(), ledger.clone());
        let queue = Queue::new(store.clone());
        let correlator = Correlator::new(store.clone(), ledger.clone());
        let mut registry = Registry::default();
        let coordinator = Arc::new(Coordinator::new(
            ledger.clone(),
            referrals.clone(),
            queue,
            emitter,
            &mut registry,
        ));
        (
            Dispatcher::new(ledger, referrals, correlator, coordinator),
            store,
        )
    }

    fn throw_command(account: AccountId) -> Command {
        Command::Throw {
            conversation: -1001,
            account,
            throws: 5,
            tier: Tier::Ordinary,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_balance_defers_to_payment() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([6; 5]));
        store.ensure_account(7).await.unwrap();

        let events = dispatcher.dispatch(throw_command(7)).await;
        let [Event::PaymentRequested { account, token, amount }] = &events[..] else {
            panic!("expected a payment request, got {events:?}");
        };
        assert_eq!(*account, 7);
        assert_eq!(*amount, 5 * Tier::Ordinary.throw_cost());

        // The issued token round-trips to the deferred session parameters.
        let decoded = PaymentToken::decode(token).unwrap();
        assert_eq!(decoded.throws, 5);
        assert_eq!(decoded.tier, Tier::Ordinary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_confirmation_resumes_deferred_session() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([6; 5]));
        store.ensure_account(7).await.unwrap();
        store.adjust_balance(7, 2).await.unwrap();

        let events = dispatcher.dispatch(throw_command(7)).await;
        let Event::PaymentRequested { token, amount, .. } = &events[0] else {
            panic!("expected a payment request");
        };

        let events = dispatcher
            .dispatch(Command::PaymentConfirmed {
                conversation: -1001,
                token: token.clone(),
                paid_amount: *amount,
            })
            .await;

        // The resumed session ran with the deferred parameters.
        let resolved = events
            .iter()
            .find_map(|e| match e {
                Event::SessionResolved { throws, outcome, .. } => Some((throws.len(), *outcome)),
                _ => None,
            })
            .expect("session should have resolved");
        assert_eq!(resolved, (5, Outcome::Win));

        // The out-of-band payment reset the balance and counted as spend.
        let account = store.account(7).await.unwrap().unwrap();
        assert_eq!(account.virtual_balance, 0);
        assert_eq!(account.spent, *amount);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_replay_is_rejected() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([6; 10]));
        store.ensure_account(7).await.unwrap();

        let events = dispatcher.dispatch(throw_command(7)).await;
        let Event::PaymentRequested { token, amount, .. } = &events[0] else {
            panic!("expected a payment request");
        };
        let confirm = Command::PaymentConfirmed {
            conversation: -1001,
            token: token.clone(),
            paid_amount: *amount,
        };

        dispatcher.dispatch(confirm.clone()).await;
        let replay = dispatcher.dispatch(confirm).await;
        let [Event::Error { code, .. }] = &replay[..] else {
            panic!("expected an error, got {replay:?}");
        };
        assert_eq!(*code, ERROR_DUPLICATE_TOKEN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_win_emits_debit_session_and_reward() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([4, 5, 6, 4, 6]));
        store.ensure_account(7).await.unwrap();
        store.adjust_balance(7, 5).await.unwrap();

        let events = dispatcher.dispatch(throw_command(7)).await;
        assert!(matches!(
            events[0],
            Event::DebitConfirmed {
                account: 7,
                amount: 5,
                balance: 0
            }
        ));
        assert!(matches!(
            events[1],
            Event::SessionResolved {
                outcome: Outcome::Win,
                reward_amount: Some(_),
                ..
            }
        ));
        assert!(matches!(events[2], Event::RewardQueued { beneficiary: 7, .. }));

        let queued = store.claim_tasks(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].status, TaskStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_emits_no_reward() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([4, 5, 6, 3, 6]));
        store.ensure_account(7).await.unwrap();
        store.adjust_balance(7, 5).await.unwrap();

        let events = dispatcher.dispatch(throw_command(7)).await;
        assert!(events
            .iter()
            .all(|e| !matches!(e, Event::RewardQueued { .. })));
        assert!(store.claim_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_precheckout_always_accepted() {
        let (dispatcher, _) = dispatcher(ScriptedEmitter::landing([]));
        let events = dispatcher
            .dispatch(Command::PreCheckout {
                id: "q-123".to_string(),
            })
            .await;
        assert_eq!(
            events,
            vec![Event::PreCheckoutAccepted {
                id: "q-123".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_throw_count_rejected() {
        let (dispatcher, _) = dispatcher(ScriptedEmitter::landing([]));
        let events = dispatcher
            .dispatch(Command::Throw {
                conversation: -1001,
                account: 7,
                throws: MAX_THROWS + 1,
                tier: Tier::Ordinary,
            })
            .await;
        let [Event::Error { code, .. }] = &events[..] else {
            panic!("expected an error");
        };
        assert_eq!(*code, ERROR_INVALID_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_referral_visit_and_duplicate() {
        let (dispatcher, _) = dispatcher(ScriptedEmitter::landing([]));
        let events = dispatcher
            .dispatch(Command::ReferralVisit {
                referred: 2,
                inviter: 1,
            })
            .await;
        assert_eq!(
            events,
            vec![Event::ReferralRegistered {
                referred: 2,
                inviter: 1
            }]
        );

        let events = dispatcher
            .dispatch(Command::ReferralVisit {
                referred: 2,
                inviter: 3,
            })
            .await;
        assert!(matches!(events[0], Event::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_surface() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([]));

        dispatcher
            .dispatch(Command::Admin(AdminCommand::SetBalance {
                account: 7,
                value: 40,
            }))
            .await;
        assert_eq!(
            store.account(7).await.unwrap().unwrap().virtual_balance,
            40
        );

        dispatcher
            .dispatch(Command::Admin(AdminCommand::TopUpPool { amount: 100 }))
            .await;
        let events = dispatcher.dispatch(Command::Admin(AdminCommand::Stats)).await;
        assert_eq!(
            events,
            vec![Event::Stats {
                accounts: 1,
                pool: 100
            }]
        );

        dispatcher
            .dispatch(Command::Admin(AdminCommand::Ban { account: 7 }))
            .await;
        assert!(store.account(7).await.unwrap().unwrap().banned);
        dispatcher
            .dispatch(Command::Admin(AdminCommand::Unban { account: 7 }))
            .await;
        assert!(!store.account(7).await.unwrap().unwrap().banned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banned_account_cannot_throw() {
        let (dispatcher, store) = dispatcher(ScriptedEmitter::landing([6; 5]));
        store.ensure_account(7).await.unwrap();
        store.adjust_balance(7, 5).await.unwrap();
        store.set_banned(7, true).await.unwrap();

        let events = dispatcher.dispatch(throw_command(7)).await;
        let [Event::Error { code, .. }] = &events[..] else {
            panic!("expected an error");
        };
        assert_eq!(*code, ERROR_BANNED);
    }
}
