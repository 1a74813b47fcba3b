//! Bot runners.
//!
//! A [`BotRunner`] owns the Telegram client of one bot and the thread that
//! drives its update loop. Every runner gets its own single-threaded tokio
//! runtime, so a slow or failing bot never stalls the others.
//!
//! Runners move through [`RunnerState`]:
//!
//! ```text
//! Uninitialized -> Starting -> Running -> Stopping -> Stopped
//!                     |
//!                     +-> Failed
//! ```
//!
//! [`BotRegistry`] hands out exactly one runner per [`Settings`].

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{Builder as ThreadBuilder, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use teloxide::{
    error_handlers::LoggingErrorHandler,
    prelude::*,
    update_listeners::{self, UpdateListener},
    RequestError,
};
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use tokio::sync::oneshot;
use url::Url;

use crate::{
    config::Settings,
    dispatcher::build_dispatcher,
    error::{Error, Result},
    module_mgr::ModuleManager,
    modules::{settings::SettingsModule, start::Start},
    types::TeloxideDispatcher,
};

const SHUTDOWN_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Uninitialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// A start step failed. Failed runners are never restarted.
    Failed,
}

/// Tuning for the Telegram client of every runner.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Bot API server to talk to, [`None`] for the official one.
    pub api_url: Option<Url>,
    /// Timeout of a single Bot API request, must exceed the long polling
    /// timeout.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Upper bound for the whole start sequence.
    pub startup_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            api_url: None,
            request_timeout: Duration::from_secs(40),
            connect_timeout: Duration::from_secs(120),
            pool_max_idle_per_host: 40,
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// One running bot, bound to one [`Settings`].
#[derive(Debug)]
pub struct BotRunner {
    settings: Arc<Settings>,
    state: Arc<Mutex<RunnerState>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Set by a `stop()` that arrives before the runner is running.
    stop_requested: AtomicBool,
}

impl BotRunner {
    fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            state: Arc::new(Mutex::new(RunnerState::Uninitialized)),
            stop_tx: Mutex::new(None),
            thread: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunnerState::Running
    }

    fn set_state(&self, state: RunnerState) {
        *self.state.lock() = state;
        debug!("Bot \"{}\" is {:?}", self.settings.name(), state);
    }

    /// Runs the start sequence on the calling thread, then hands the update
    /// loop over to a dedicated thread.
    ///
    /// This blocks on its own runtime, so it must not be called from within
    /// an async context.
    fn start(&self, options: &RunnerOptions) -> Result<()> {
        self.set_state(RunnerState::Starting);
        match self.try_start(options) {
            Ok(()) => {
                if self.is_running() {
                    info!("Bot \"{}\" is started!", self.settings.name());
                }
                Ok(())
            }
            Err(err) => {
                self.set_state(RunnerState::Failed);
                error!("Failed to start bot \"{}\": {}", self.settings.name(), err);
                Err(err)
            }
        }
    }

    fn try_start(&self, options: &RunnerOptions) -> Result<()> {
        let path = self.settings.location().to_owned();
        let name = self.settings.name();

        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;
        let timeout = options.startup_timeout;
        let settings = Arc::clone(&self.settings);
        let options = options.clone();
        // The timer has to be created inside the runtime.
        let started = runtime.block_on(async move {
            tokio::time::timeout(timeout, init_bot(settings, options)).await
        });
        let (dispatcher, listener) = match started {
            Ok(Ok(parts)) => parts,
            Ok(Err(source)) => return Err(Error::Startup { path, source }),
            Err(_) => return Err(Error::StartupTimeout { path, timeout }),
        };

        let mut thread = self.thread.lock();
        if self.stop_requested.load(Ordering::SeqCst) {
            info!("Bot \"{}\" was stopped while starting", name);
            self.set_state(RunnerState::Stopped);
            return Ok(());
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        *self.stop_tx.lock() = Some(stop_tx);
        // Set before spawning, the thread marks the runner stopped on exit.
        self.set_state(RunnerState::Running);

        let state = Arc::clone(&self.state);
        let thread_name = name.clone();
        let join_handle = ThreadBuilder::new()
            .name(format!("bot-{}", name))
            .spawn(move || {
                let _stopped = StoppedOnExit(state);
                drive(runtime, dispatcher, listener, stop_rx);
                info!("Bot \"{}\" has stopped", thread_name);
            })?;
        *thread = Some(join_handle);

        Ok(())
    }

    /// Stops the update loop and waits for the runner's thread to finish.
    ///
    /// A stop that arrives while the runner is still starting is remembered,
    /// the runner then ends up `Stopped` instead of `Running`. Otherwise this
    /// does nothing if the runner is not running. Must not be called from one
    /// of this bot's own handlers.
    pub fn stop(&self) {
        let join_handle = {
            let mut thread = self.thread.lock();
            match thread.take() {
                Some(join_handle) => join_handle,
                None => {
                    if matches!(
                        self.state(),
                        RunnerState::Uninitialized | RunnerState::Starting
                    ) {
                        self.stop_requested.store(true, Ordering::SeqCst);
                    }
                    return;
                }
            }
        };

        {
            let mut state = self.state.lock();
            if *state == RunnerState::Running {
                *state = RunnerState::Stopping;
            }
        }
        info!("Stopping bot \"{}\"...", self.settings.name());

        if let Some(stop_tx) = self.stop_tx.lock().take() {
            // The loop may already be gone.
            let _ = stop_tx.send(());
        }
        if let Err(payload) = join_handle.join() {
            error!(
                "The update loop of bot \"{}\" panicked: {}",
                self.settings.name(),
                panic_message(payload.as_ref())
            );
        }

        self.set_state(RunnerState::Stopped);
    }
}

struct StoppedOnExit(Arc<Mutex<RunnerState>>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        *self.0.lock() = RunnerState::Stopped;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<unknown>"
    }
}

async fn init_bot(
    settings: Arc<Settings>,
    options: RunnerOptions,
) -> anyhow::Result<(
    TeloxideDispatcher,
    impl UpdateListener<Err = RequestError> + Send,
)> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(options.request_timeout)
        .connect_timeout(options.connect_timeout)
        .pool_max_idle_per_host(options.pool_max_idle_per_host)
        .build()
        .context("failed to build the HTTP client")?;
    let mut bot = Bot::with_client(settings.token(), client);
    if let Some(api_url) = options.api_url {
        bot = bot.set_api_url(api_url);
    }

    debug!("Initializing modules...");
    let mut module_mgr = ModuleManager::new();
    module_mgr.register_module(SettingsModule::new(Arc::clone(&settings)));
    module_mgr.register_module(Start);
    let mut dep_map = DependencyMap::new();
    module_mgr.register_dependencies(&mut dep_map).await?;

    let me = bot
        .get_me()
        .await
        .context("failed to initialize the bot")?;
    debug!(
        "Bot \"{}\" is authorized as @{}",
        settings.name(),
        me.user.username.as_deref().unwrap_or("<none>")
    );

    let listener = update_listeners::polling_default(bot.clone()).await;
    let dispatcher = build_dispatcher(bot, &module_mgr, dep_map);
    Ok((dispatcher, listener))
}

/// Drives the update loop until a stop is requested or the listener ends,
/// then tears the runtime down.
fn drive<L>(
    runtime: Runtime,
    mut dispatcher: TeloxideDispatcher,
    listener: L,
    stop_rx: oneshot::Receiver<()>,
) where
    L: UpdateListener<Err = RequestError> + Send,
{
    let shutdown_token = dispatcher.shutdown_token();
    runtime.spawn(async move {
        // A dropped sender counts as a stop request too.
        let _ = stop_rx.await;
        loop {
            match shutdown_token.shutdown() {
                Ok(done) => {
                    done.await;
                    break;
                }
                // The dispatcher has not started dispatching yet.
                Err(_) => tokio::time::sleep(SHUTDOWN_RETRY_INTERVAL).await,
            }
        }
    });

    runtime.block_on(dispatcher.dispatch_with_listener(
        listener,
        LoggingErrorHandler::with_custom_text("An error from the update listener"),
    ));

    drop(dispatcher);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
}

/// Hands out one [`BotRunner`] per [`Settings`], keyed by the settings path.
#[derive(Debug, Default)]
pub struct BotRegistry {
    options: RunnerOptions,
    runners: Mutex<HashMap<PathBuf, Arc<BotRunner>>>,
}

impl BotRegistry {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Returns the runner for `settings`, starting it on first use.
    ///
    /// Blocks until the start sequence completes. Fails with
    /// [`Error::RunnerFailed`] if an earlier start for these settings failed.
    ///
    /// A call racing the first one for the same settings returns the runner
    /// right away, possibly still `Starting`; check [`BotRunner::state`].
    pub fn get_or_create(&self, settings: &Arc<Settings>) -> Result<Arc<BotRunner>> {
        let path = settings.location();
        let runner = {
            let mut runners = self.runners.lock();
            if let Some(runner) = runners.get(path) {
                if runner.state() == RunnerState::Failed {
                    return Err(Error::RunnerFailed(path.to_owned()));
                }
                return Ok(Arc::clone(runner));
            }

            let runner = Arc::new(BotRunner::new(Arc::clone(settings)));
            runners.insert(path.to_owned(), Arc::clone(&runner));
            runner
        };

        runner.start(&self.options)?;
        Ok(runner)
    }

    pub fn get<P>(&self, path: P) -> Option<Arc<BotRunner>>
    where
        P: AsRef<Path>,
    {
        self.runners.lock().get(path.as_ref()).cloned()
    }

    pub fn all(&self) -> Vec<Arc<BotRunner>> {
        self.runners.lock().values().cloned().collect()
    }

    /// Stops every runner, one after another.
    pub fn stop_all(&self) {
        for runner in self.all() {
            runner.stop();
        }
    }
}
