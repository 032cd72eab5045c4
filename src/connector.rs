//! UniPass wallet connector.
//!
//! Presents `activate`, `connect_eagerly` and `switch_chain_id` to the host framework and
//! backs them with a provider that is created lazily, once, on first use. Failures of an
//! attempt never reach the caller: they are logged and turned into a cancelled activation.

use std::sync::{Arc, Mutex};

use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

use crate::{
    actions::Actions,
    error::{ConnectorError, ProviderRpcError},
    provider::{ListenerId, ProviderFactory, WalletProvider},
    types::{AccountRecord, ProviderEvent, ProviderOptions, RequestArguments, StateUpdate},
};

/// Receives errors carried by provider disconnect events.
pub type ErrorHandler = Arc<dyn Fn(ProviderRpcError) + Send + Sync>;

pub struct UniPassConnector<A: Actions> {
    actions: Arc<A>,
    options: ProviderOptions,
    on_error: Option<ErrorHandler>,
    factory: Arc<dyn ProviderFactory>,
    provider: OnceCell<Arc<dyn WalletProvider>>,
    account: RwLock<Option<AccountRecord>>,
    listener: Mutex<Option<ListenerId>>,
}

impl<A: Actions> UniPassConnector<A> {
    pub fn new(
        actions: Arc<A>,
        options: ProviderOptions,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            actions,
            options,
            on_error: None,
            factory,
            provider: OnceCell::new(),
            account: RwLock::new(None),
            listener: Mutex::new(None),
        }
    }

    pub fn with_error_handler(
        mut self,
        handler: impl Fn(ProviderRpcError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Provider handle, once initialization has succeeded.
    pub fn provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.get().cloned()
    }

    /// Account from the most recent successful connect.
    pub async fn account(&self) -> Option<AccountRecord> {
        self.account.read().await.clone()
    }

    pub async fn connect_eagerly(&self) {
        self.connect().await
    }

    pub async fn activate(&self) {
        self.connect().await
    }

    pub async fn switch_chain_id(&self, chain_id: u64) {
        let cancel_activation = self.actions.start_activation();

        if let Err(err) = self.try_switch_chain(chain_id).await {
            debug!(chain_id, "could not switch chain: {err}");
            cancel_activation.cancel();
        }
    }

    pub fn reset_state(&self) {
        self.actions.reset_state();
    }

    async fn connect(&self) {
        let cancel_activation = self.actions.start_activation();

        if let Err(err) = self.try_connect().await {
            debug!("could not connect: {err}");
            cancel_activation.cancel();
        }
    }

    async fn try_connect(&self) -> Result<(), ConnectorError> {
        let provider = self.initialize().await?;

        let account = provider
            .connect()
            .await?
            .filter(|account| !account.address.is_empty())
            .ok_or(ConnectorError::NoAccounts)?;

        let chain_id = self.options.reported_chain_id();
        let update = StateUpdate::connected(chain_id, account.address.clone());
        *self.account.write().await = Some(account);
        self.actions.update(update);
        Ok(())
    }

    async fn try_switch_chain(&self, chain_id: u64) -> Result<(), ConnectorError> {
        let provider = self.provider.get().ok_or(ConnectorError::NotInitialized)?;

        provider
            .request(RequestArguments::switch_chain(chain_id))
            .await?;

        let address = self
            .account
            .read()
            .await
            .as_ref()
            .map(|account| account.address.clone())
            .unwrap_or_default();
        self.actions.update(StateUpdate::connected(chain_id, address));
        Ok(())
    }

    /// Single-flight: concurrent callers share one attempt and a failure is not cached.
    async fn initialize(&self) -> Result<&Arc<dyn WalletProvider>, ConnectorError> {
        self.provider
            .get_or_try_init(|| async {
                info!("initializing wallet provider");
                let provider = self.factory.create(&self.options).await?;
                self.listen_for_disconnect(provider.as_ref());
                Ok(provider)
            })
            .await
    }

    /// The listener runs inside the provider's emit, so the reset lands before any later
    /// connect can update the host.
    fn listen_for_disconnect(&self, provider: &dyn WalletProvider) {
        let actions = Arc::clone(&self.actions);
        let on_error = self.on_error.clone();

        let id = provider.on(Arc::new(move |event| match event {
            ProviderEvent::Disconnect(error) => on_disconnect(&*actions, on_error.as_ref(), error),
        }));

        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *listener = Some(id);
    }
}

/// Reset runs for every disconnect, including ones that arrive before any session existed.
fn on_disconnect<A: Actions>(
    actions: &A,
    on_error: Option<&ErrorHandler>,
    error: Option<ProviderRpcError>,
) {
    info!("provider disconnected");
    actions.reset_state();
    if let (Some(error), Some(handler)) = (error, on_error) {
        handler(error);
    }
}

impl<A: Actions> Drop for UniPassConnector<A> {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let (Some(id), Some(provider)) = (listener, self.provider.get()) {
            provider.remove_listener(id);
        }
    }
}

impl<A: Actions> std::fmt::Debug for UniPassConnector<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniPassConnector")
            .field("options", &self.options)
            .field("initialized", &self.provider.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::CancelActivation,
        provider::{EventEmitter, EventListener, ProviderResult},
    };
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start,
        Cancel,
        Update(StateUpdate),
        Reset,
    }

    #[derive(Default)]
    struct RecordingActions {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingActions {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn updates(&self) -> Vec<StateUpdate> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Update(update) => Some(update),
                    _ => None,
                })
                .collect()
        }
    }

    impl Actions for RecordingActions {
        fn start_activation(&self) -> CancelActivation {
            self.calls.lock().unwrap().push(Call::Start);
            let calls = Arc::clone(&self.calls);
            CancelActivation::new(move || calls.lock().unwrap().push(Call::Cancel))
        }

        fn update(&self, update: StateUpdate) {
            self.calls.lock().unwrap().push(Call::Update(update));
        }

        fn reset_state(&self) {
            self.calls.lock().unwrap().push(Call::Reset);
        }
    }

    struct ScriptedProvider {
        account: Option<AccountRecord>,
        switch_result: Result<(), ProviderRpcError>,
        requests: Mutex<Vec<RequestArguments>>,
        events: EventEmitter,
    }

    impl ScriptedProvider {
        fn new(account: Option<AccountRecord>) -> Self {
            Self {
                account,
                switch_result: Ok(()),
                requests: Mutex::new(Vec::new()),
                events: EventEmitter::new(),
            }
        }
    }

    #[async_trait]
    impl WalletProvider for ScriptedProvider {
        async fn connect(&self) -> ProviderResult<Option<AccountRecord>> {
            tokio::task::yield_now().await;
            Ok(self.account.clone())
        }

        async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
            self.requests.lock().unwrap().push(args);
            self.switch_result.clone().map(|()| Value::Null)
        }

        fn on(&self, listener: EventListener) -> ListenerId {
            self.events.on(listener)
        }

        fn remove_listener(&self, id: ListenerId) {
            self.events.remove_listener(id)
        }

        async fn disconnect(&self) {
            self.events.emit(ProviderEvent::Disconnect(None));
        }
    }

    struct CountingFactory {
        provider: Arc<ScriptedProvider>,
        created: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl CountingFactory {
        fn new(provider: ScriptedProvider) -> Arc<Self> {
            Arc::new(Self {
                provider: Arc::new(provider),
                created: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
            })
        }

        fn failing_once(provider: ScriptedProvider) -> Arc<Self> {
            let factory = Self::new(provider);
            factory.failures_left.store(1, Ordering::SeqCst);
            factory
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderFactory for CountingFactory {
        async fn create(
            &self,
            _options: &ProviderOptions,
        ) -> Result<Arc<dyn WalletProvider>, ConnectorError> {
            tokio::task::yield_now().await;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ConnectorError::Initialization("module failed to load".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(self.provider.clone())
        }
    }

    fn connector(
        factory: Arc<CountingFactory>,
        options: ProviderOptions,
    ) -> (UniPassConnector<RecordingActions>, Arc<RecordingActions>) {
        let actions = Arc::new(RecordingActions::default());
        let connector = UniPassConnector::new(actions.clone(), options, factory);
        (connector, actions)
    }

    #[tokio::test]
    async fn activate_reports_configured_chain_and_account() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) =
            connector(factory, ProviderOptions::default().with_chain_id(137));

        connector.activate().await;

        assert_eq!(
            actions.calls(),
            vec![Call::Start, Call::Update(StateUpdate::connected(137, "0x1"))]
        );
        assert_eq!(connector.account().await.unwrap().address, "0x1");
    }

    #[tokio::test]
    async fn unset_chain_id_reports_default() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory, ProviderOptions::default());

        connector.connect_eagerly().await;

        assert_eq!(actions.updates(), vec![StateUpdate::connected(137, "0x1")]);
    }

    #[tokio::test]
    async fn concurrent_activations_construct_provider_once() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        tokio::join!(
            connector.activate(),
            connector.connect_eagerly(),
            connector.activate()
        );

        assert_eq!(factory.created(), 1);
        assert_eq!(actions.updates().len(), 3);
        assert!(!actions.calls().contains(&Call::Cancel));
    }

    #[tokio::test]
    async fn missing_account_cancels_activation() {
        let factory = CountingFactory::new(ScriptedProvider::new(None));
        let (connector, actions) = connector(factory, ProviderOptions::default());

        connector.activate().await;

        assert_eq!(actions.calls(), vec![Call::Start, Call::Cancel]);
        assert!(connector.account().await.is_none());
    }

    #[tokio::test]
    async fn empty_address_counts_as_no_account() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new(""))));
        let (connector, actions) = connector(factory, ProviderOptions::default());

        connector.activate().await;

        assert_eq!(actions.calls(), vec![Call::Start, Call::Cancel]);
    }

    #[tokio::test]
    async fn failed_initialization_is_retried_on_next_call() {
        let factory =
            CountingFactory::failing_once(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        connector.activate().await;
        assert_eq!(actions.calls(), vec![Call::Start, Call::Cancel]);
        assert!(connector.provider().is_none());

        connector.activate().await;
        assert_eq!(factory.created(), 1);
        assert_eq!(actions.updates(), vec![StateUpdate::connected(137, "0x1")]);
    }

    #[tokio::test]
    async fn switch_before_activation_never_touches_provider() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        connector.switch_chain_id(10).await;

        assert_eq!(actions.calls(), vec![Call::Start, Call::Cancel]);
        assert_eq!(factory.created(), 0);
        assert!(factory.provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn switch_reuses_cached_account() {
        let factory =
            CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0xABC"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        connector.activate().await;
        connector.switch_chain_id(10).await;

        assert_eq!(
            actions.updates().last(),
            Some(&StateUpdate::connected(10, "0xABC"))
        );
        let requests = factory.provider.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![RequestArguments::switch_chain(10)]);
    }

    #[tokio::test]
    async fn rejected_switch_cancels_activation() {
        let mut provider = ScriptedProvider::new(Some(AccountRecord::new("0xABC")));
        provider.switch_result = Err(ProviderRpcError::new(4902, "unrecognized chain"));
        let factory = CountingFactory::new(provider);
        let (connector, actions) = connector(factory, ProviderOptions::default());

        connector.activate().await;
        connector.switch_chain_id(99).await;

        assert_eq!(actions.calls().last(), Some(&Call::Cancel));
        assert_eq!(actions.updates().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_event_resets_and_forwards_error() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let actions = Arc::new(RecordingActions::default());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let connector =
            UniPassConnector::new(actions.clone(), ProviderOptions::default(), factory.clone())
                .with_error_handler(move |err| sink.lock().unwrap().push(err));

        connector.activate().await;
        let error = ProviderRpcError::new(4900, "session closed").with_data(json!({"reason": "x"}));
        factory
            .provider
            .events
            .emit(ProviderEvent::Disconnect(Some(error.clone())));

        assert_eq!(actions.calls().last(), Some(&Call::Reset));
        assert_eq!(received.lock().unwrap().clone(), vec![error]);
        assert!(connector.provider().is_some());
    }

    #[tokio::test]
    async fn disconnect_without_error_or_handler_only_resets() {
        let factory = CountingFactory::new(ScriptedProvider::new(None));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        // Initialization succeeds even though connect yields no account.
        connector.activate().await;
        factory.provider.disconnect().await;
        factory
            .provider
            .events
            .emit(ProviderEvent::Disconnect(Some(ProviderRpcError::disconnected("gone"))));

        let resets = actions
            .calls()
            .into_iter()
            .filter(|call| *call == Call::Reset)
            .count();
        assert_eq!(resets, 2);
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_keeps_new_session() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        connector.activate().await;
        factory.provider.disconnect().await;
        assert_eq!(actions.calls().last(), Some(&Call::Reset));

        connector.activate().await;
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            actions.calls().last(),
            Some(&Call::Update(StateUpdate::connected(137, "0x1")))
        );
    }

    #[tokio::test]
    async fn dropping_connector_unregisters_listener() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        connector.activate().await;
        assert_eq!(factory.provider.events.listener_count(), 1);
        drop(connector);

        factory.provider.events.emit(ProviderEvent::Disconnect(None));

        assert_eq!(factory.provider.events.listener_count(), 0);
        assert!(!actions.calls().contains(&Call::Reset));
    }

    #[tokio::test]
    async fn dropping_uninitialized_connector_is_safe() {
        let factory = CountingFactory::new(ScriptedProvider::new(Some(AccountRecord::new("0x1"))));
        let (connector, actions) = connector(factory.clone(), ProviderOptions::default());

        drop(connector);

        assert_eq!(factory.created(), 0);
        assert_eq!(factory.provider.events.listener_count(), 0);
        assert!(actions.calls().is_empty());
    }
}
