//! The device-service lifecycle: construction, the bootstrap sequence
//! against registry/core-data/core-metadata, and orderly shutdown.

use crate::{
    clients, config::Config, dispatch::StripedLocks, discovery, dispatch,
    events, http, logging, pool::WorkerPool, profiles,
    scheduler::{Job, JobAction, Scheduler},
    cache::DeviceCache,
};
use edgeline_api::{
    client::{CoreDataClient, MetadataClient, RegistryClient},
    driver::{CommandRequest, CommandResult, ProtocolDriver},
    types::{
        device::{
            Addressable, AdminState, DeviceServiceRecord, OperatingState,
        },
        schedule::{Schedule, ScheduleEvent},
    },
    Error, Result,
};
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex, RwLock,
};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

pub(crate) const API_DEVICE: &str = "/api/v1/device/";
pub(crate) const API_DISCOVERY: &str = "/api/v1/discovery";
pub(crate) const API_CALLBACK: &str = "/api/v1/callback";

const ADDR_EXT: &str = "_addr";
const REGISTRY_RETRIES: u32 = 5;

/// How much of the REST surface is live. The callback endpoint comes
/// up before metadata reconciliation so device changes racing with
/// startup are not lost; device and discovery follow driver init; the
/// auxiliary endpoints arrive last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
#[repr(u8)]
pub enum Stage {
    Down = 0,
    Callback = 1,
    Device = 2,
    Full = 3,
}

pub struct DeviceService {
    name: String,
    version: String,
    driver: Arc<dyn ProtocolDriver>,
    config: tokio::sync::RwLock<Config>,
    cache: DeviceCache,
    pool: WorkerPool,
    scheduler: Scheduler,
    stage: AtomicU8,
    data: RwLock<Option<Arc<dyn CoreDataClient>>>,
    metadata: RwLock<Option<Arc<dyn MetadataClient>>>,
    device_locks: StripedLocks,
    http: Mutex<Option<http::HttpHandle>>,
}

impl DeviceService {
    /// Creates a device service around a protocol driver. The name
    /// scopes configuration and metadata lookups; the version string
    /// is informational.
    pub fn new(
        name: &str,
        version: &str,
        driver: Arc<dyn ProtocolDriver>,
    ) -> Result<Arc<DeviceService>> {
        if name.is_empty() {
            return Err(Error::NoDeviceName);
        }
        if version.is_empty() {
            return Err(Error::NoDeviceVersion);
        }

        Ok(Arc::new(DeviceService {
            name: name.to_string(),
            version: version.to_string(),
            driver,
            config: tokio::sync::RwLock::new(Config::default()),
            cache: DeviceCache::new(),
            pool: WorkerPool::new(crate::pool::POOL_WORKERS),
            scheduler: Scheduler::new(),
            stage: AtomicU8::new(Stage::Down as u8),
            data: RwLock::new(None),
            metadata: RwLock::new(None),
            device_locks: StripedLocks::new(16),
            http: Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub(crate) fn driver(&self) -> &Arc<dyn ProtocolDriver> {
        &self.driver
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(crate) fn device_locks(&self) -> &StripedLocks {
        &self.device_locks
    }

    pub(crate) fn data(&self) -> Result<Arc<dyn CoreDataClient>> {
        self.data.read().unwrap().clone().ok_or_else(|| {
            Error::OperationError("core-data client is not wired".into())
        })
    }

    pub(crate) fn metadata(&self) -> Result<Arc<dyn MetadataClient>> {
        self.metadata.read().unwrap().clone().ok_or_else(|| {
            Error::OperationError("core-metadata client is not wired".into())
        })
    }

    pub(crate) async fn data_transform(&self) -> bool {
        self.config.read().await.device.data_transform
    }

    pub(crate) async fn config_nvpairs(
        &self,
    ) -> edgeline_api::client::NvPairs {
        self.config.read().await.to_nvpairs()
    }

    pub(crate) fn stage_at_least(&self, stage: Stage) -> bool {
        self.stage.load(Ordering::Acquire) >= stage as u8
    }

    fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::Release)
    }

    /// Starts the service: resolves configuration from the registry
    /// or from `conf_dir`, reconciles metadata, brings up the REST
    /// surface and the scheduler, and runs the driver's `init`. A
    /// failure at any step aborts startup; call [`DeviceService::stop`]
    /// to release whatever was brought up before the failure.
    pub async fn start(
        self: &Arc<Self>,
        registry_url: Option<&str>,
        profile: Option<&str>,
        conf_dir: &str,
    ) -> Result<()> {
        let conf_dir = if conf_dir.is_empty() { "res" } else { conf_dir };
        let mut registry: Option<Arc<dyn RegistryClient>> = None;
        let mut upload_config = false;
        let mut cfg: Option<Config> = None;

        if let Some(url) = registry_url {
            let client: Arc<dyn RegistryClient> =
                Arc::new(clients::registry::for_url(url)?);

            wait_for_peer("registry", REGISTRY_RETRIES, Duration::from_secs(1), || {
                client.ping()
            })
            .await?;

            let pairs = client.get_config(&self.name, profile).await;

            match pairs {
                Ok(pairs) if !pairs.is_empty() => {
                    let mut overlaid = Config::default();

                    overlaid.apply_nvpairs(&pairs)?;
                    cfg = Some(overlaid);
                }
                _ => {
                    info!("Unable to get configuration from registry.");
                    info!("Will load from file.");
                    upload_config = true;
                }
            }
            registry = Some(client);
        }

        let mut cfg = match cfg {
            Some(cfg) => cfg,
            None => Config::load(conf_dir, profile).await?,
        };

        if cfg.device.profiles_dir.is_none() {
            cfg.device.profiles_dir = Some(conf_dir.to_string());
        }

        logging::init(cfg.log_level(), cfg.logging.file.as_deref());
        if let Some(url) = &cfg.logging.remote_url {
            debug!("remote log sink configured at {}", url);
        }

        *self.config.write().await = cfg;

        self.start_configured(registry, upload_config, profile).await
    }

    pub(crate) async fn start_configured(
        self: &Arc<Self>,
        registry: Option<Arc<dyn RegistryClient>>,
        upload_config: bool,
        profile: Option<&str>,
    ) -> Result<()> {
        let cfg = self.config.read().await.clone();

        if upload_config {
            if let Some(registry) = &registry {
                info!("Uploading configuration to registry.");
                if let Err(e) = registry
                    .put_config(&self.name, profile, &cfg.to_nvpairs())
                    .await
                {
                    error!("Unable to upload config: {}", &e);
                    return Err(e);
                }
            }
        }

        debug!(
            "Starting {} device service, version {}",
            &self.name, &self.version
        );
        for (name, value) in cfg.to_nvpairs() {
            debug!("  {} = {}", name, value);
        }

        // Wire the REST clients unless the embedder injected its own.

        if self.data.read().unwrap().is_none() {
            *self.data.write().unwrap() = Some(Arc::new(
                clients::data::DataClient::new(&cfg.clients.data.url()),
            ));
        }
        if self.metadata.read().unwrap().is_none() {
            *self.metadata.write().unwrap() = Some(Arc::new(
                clients::metadata::MetaClient::new(
                    &cfg.clients.metadata.url(),
                ),
            ));
        }

        // Wait for core-data and core-metadata to be available.

        let delay = Duration::from_millis(cfg.service.timeout);
        let data = self.data()?;
        let metadata = self.metadata()?;

        wait_for_peer("core-data", cfg.service.connect_retries, delay, || {
            data.ping()
        })
        .await?;
        wait_for_peer(
            "core-metadata",
            cfg.service.connect_retries,
            delay,
            || metadata.ping(),
        )
        .await?;

        // The callback endpoint must be live before reconciliation so
        // metadata-side changes racing with startup are not lost.

        let handle = http::start(self.clone(), cfg.service.port).await?;

        *self.http.lock().unwrap() = Some(handle);
        self.set_stage(Stage::Callback);

        self.register_service_record(&cfg).await?;

        // Load profiles from files, then devices from metadata, then
        // any devices declared in configuration.

        if let Some(dir) = &cfg.device.profiles_dir {
            profiles::upload(dir, &self.cache, &metadata).await?;
        }
        self.devices().await?;
        self.process_configured_devices(&cfg.device_list).await?;

        // Driver configuration.

        if let Err(e) = self.driver.init(&cfg.driver_pairs()).await {
            error!("Protocol driver initialization failed");
            return Err(Error::DriverUnstart(e.to_string()));
        }
        self.set_stage(Stage::Device);

        // Upload schedules and schedule events, then build the
        // runtime jobs from what metadata now holds.

        self.upload_schedules(&cfg).await?;
        self.upload_schedule_events(&cfg).await?;

        for job in self.jobs_from_metadata().await? {
            self.scheduler.add(job);
        }

        let svc = self.clone();

        self.scheduler.start(move |job| svc.run_job(job));
        self.set_stage(Stage::Full);

        if let Some(registry) = &registry {
            if !cfg.service.check_interval.is_empty() {
                if let Err(e) = registry
                    .register_service(
                        &self.name,
                        &cfg.service.host,
                        cfg.service.port,
                        &cfg.service.check_interval,
                    )
                    .await
                {
                    error!("Unable to register service in registry");
                    return Err(e);
                }
            }
        }

        if !cfg.service.startup_msg.is_empty() {
            debug!("{}", &cfg.service.startup_msg);
        }
        Ok(())
    }

    /// Ensures this service and its addressable exist in metadata.
    async fn register_service_record(&self, cfg: &Config) -> Result<()> {
        let metadata = self.metadata()?;

        if metadata.device_service(&self.name).await?.is_some() {
            debug!("device service {} is already registered", &self.name);
            return Ok(());
        }

        let millis = events::millitime();
        let mut addr = match metadata.addressable(&self.name).await? {
            Some(addr) => addr,
            None => {
                let mut addr = Addressable {
                    name: self.name.clone(),
                    origin: millis,
                    protocol: String::from("HTTP"),
                    method: String::from("POST"),
                    address: cfg.service.host.clone(),
                    port: cfg.service.port,
                    path: String::from(API_CALLBACK),
                    ..Addressable::default()
                };

                match metadata.create_addressable(&addr).await {
                    Ok(id) => {
                        info!("Created addressable {}", &addr.name);
                        addr.id = id;
                    }
                    Err(Error::Conflict(_)) => {
                        info!(
                            "Skipping already existing addressable {}",
                            &addr.name
                        );
                        if let Some(existing) =
                            metadata.addressable(&self.name).await?
                        {
                            addr = existing;
                        }
                    }
                    Err(e) => {
                        error!("create_addressable failed");
                        return Err(e);
                    }
                }
                addr
            }
        };

        if addr.origin == 0 {
            addr.origin = millis;
        }

        let record = DeviceServiceRecord {
            id: String::new(),
            name: self.name.clone(),
            labels: cfg.service.labels.clone(),
            admin_state: AdminState::Unlocked,
            op_state: OperatingState::Enabled,
            addressable: Some(addr),
            origin: millis,
        };

        match metadata.create_device_service(&record).await {
            Ok(_) => {
                info!("Registered device service {}", &self.name);
                Ok(())
            }
            Err(Error::Conflict(_)) => {
                info!(
                    "Skipping already existing device service {}",
                    &self.name
                );
                Ok(())
            }
            Err(e) => {
                error!("Unable to create device service in metadata");
                Err(e)
            }
        }
    }

    async fn upload_schedules(&self, cfg: &Config) -> Result<()> {
        let metadata = self.metadata()?;

        for sched in &cfg.schedules {
            let schedule = Schedule {
                id: String::new(),
                name: sched.name.clone(),
                frequency: sched.frequency.clone(),
            };

            match metadata.create_schedule(&schedule).await {
                Ok(_) => info!("Created schedule {}", &sched.name),
                Err(Error::Conflict(_)) => {
                    info!(
                        "Skipping already existing schedule {}",
                        &sched.name
                    )
                }
                Err(e) => {
                    error!("Unable to create schedule {}", &sched.name);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn upload_schedule_events(&self, cfg: &Config) -> Result<()> {
        let metadata = self.metadata()?;

        for ev in &cfg.schedule_events {
            if ev.path != API_DISCOVERY && !ev.path.starts_with(API_DEVICE) {
                error!(
                    "Scheduled event {} not valid, only discovery and device commands are allowed",
                    &ev.name
                );
                return Err(Error::BadConfig(format!(
                    "schedule event {} has invalid path {}",
                    &ev.name, &ev.path
                )));
            }

            let addr_name = format!("{}{}", &ev.name, ADDR_EXT);
            let addr = Addressable {
                name: addr_name.clone(),
                protocol: String::from("HTTP"),
                method: String::from("GET"),
                address: cfg.service.host.clone(),
                port: cfg.service.port,
                path: ev.path.clone(),
                ..Addressable::default()
            };

            match metadata.create_addressable(&addr).await {
                Ok(_) => info!("Created addressable {}", &addr_name),
                Err(Error::Conflict(_)) => {
                    info!(
                        "Skipping already existing addressable {}",
                        &addr_name
                    )
                }
                Err(e) => {
                    error!("Unable to create addressable {}", &addr_name);
                    return Err(e);
                }
            }

            let event = ScheduleEvent {
                id: String::new(),
                name: ev.name.clone(),
                schedule: ev.schedule.clone(),
                addressable: Some(addr),
                parameters: None,
                service: Some(self.name.clone()),
            };

            match metadata.create_schedule_event(&event).await {
                Ok(_) => info!("Created schedule event {}", &ev.name),
                Err(Error::Conflict(_)) => {
                    info!(
                        "Skipping already existing schedule event {}",
                        &ev.name
                    )
                }
                Err(e) => {
                    error!("Unable to create schedule event {}", &ev.name);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Builds the runtime job list from the schedule events metadata
    /// holds for this service.
    pub(crate) async fn jobs_from_metadata(&self) -> Result<Vec<Job>> {
        let metadata = self.metadata()?;
        let events = metadata
            .schedule_events_for_service(&self.name)
            .await
            .map_err(|e| {
                error!("Unable to obtain schedule events from metadata");
                e
            })?;
        let mut jobs = vec![];

        for ev in events {
            let schedule = metadata
                .schedule(&ev.schedule)
                .await?
                .ok_or_else(|| {
                    error!(
                        "Unable to obtain schedule {} from metadata",
                        &ev.schedule
                    );
                    Error::BadConfig(format!(
                        "schedule event {} names unknown schedule {}",
                        &ev.name, &ev.schedule
                    ))
                })?;
            let seconds =
                crate::config::parse_iso8601_duration(&schedule.frequency)
                    .map_err(|estr| {
                        error!(
                            "Unable to parse frequency for schedule {}, {}",
                            &schedule.name, &estr
                        );
                        Error::BadConfig(estr)
                    })?;
            let path = ev
                .addressable
                .as_ref()
                .map(|a| a.path.as_str())
                .unwrap_or("");

            let action = if path == API_DISCOVERY {
                JobAction::Discovery
            } else if let Some(suffix) = path.strip_prefix(API_DEVICE) {
                JobAction::DeviceUrl(suffix.to_string())
            } else {
                error!(
                    "Scheduled event {} is invalid, only discovery and device commands are allowed",
                    &ev.name
                );
                return Err(Error::BadConfig(format!(
                    "schedule event {} has invalid path {}",
                    &ev.name, path
                )));
            };

            jobs.push(Job {
                name: ev.name.clone(),
                action,
                period: Duration::from_secs(seconds),
                repeat: 0,
            });
        }
        Ok(jobs)
    }

    /// Rebuilds the scheduler's job set from metadata; used when a
    /// callback reports schedule-event changes.
    pub(crate) async fn resync_schedule_jobs(&self) -> Result<()> {
        let jobs = self.jobs_from_metadata().await?;

        self.scheduler.set_jobs(jobs);
        Ok(())
    }

    /// Fires one scheduled job on the worker pool.
    pub(crate) fn run_job(self: &Arc<Self>, job: &Job) {
        use tracing_futures::Instrument;

        let svc = self.clone();
        let action = job.action.clone();
        let span = tracing::info_span!("job", name = job.name.as_str());

        self.pool.submit(Box::pin(
            async move {
                match action {
                    JobAction::Discovery => {
                        let reply = discovery::trigger(&svc).await;

                        if !reply.is_success() && reply.status != 423 {
                            warn!(
                                "scheduled discovery: HTTP {}",
                                reply.status
                            )
                        }
                    }
                    JobAction::DeviceUrl(url) => {
                        let reply =
                            dispatch::device_command(&svc, &url, false, None)
                                .await;

                        if !reply.is_success() {
                            error!(
                                "Scheduled request to {}{}: HTTP {}",
                                API_DEVICE, url, reply.status
                            )
                        }
                    }
                }
            }
            .instrument(span),
        ))
    }

    /// Publishes readings produced outside the dispatcher's GET path.
    /// Never blocks on core-data; the POST happens on the worker
    /// pool.
    pub async fn post_readings(
        &self,
        device_name: &str,
        sources: &[CommandRequest],
        results: Vec<CommandResult>,
    ) {
        let transform = self.data_transform().await;

        match events::generate_event(device_name, sources, results, transform)
        {
            Ok(Some(event)) => match self.data() {
                Ok(client) => events::publish(&self.pool, client, event),
                Err(e) => error!("can't post readings: {}", &e),
            },
            Ok(None) => {
                warn!("nothing to post for {}", device_name)
            }
            Err(e) => {
                error!("can't build event for {}: {}", device_name, &e)
            }
        }
    }

    /// Stops the service. The scheduler goes first, then the REST
    /// server, the driver, and finally the worker pool, so nothing
    /// dispatches into a collaborator that's already gone.
    pub async fn stop(&self, force: bool) {
        debug!("Stop device service");
        self.scheduler.stop(force).await;

        let handle = self.http.lock().unwrap().take();

        if let Some(handle) = handle {
            let _ = handle.shutdown.send(());
            if force {
                handle.task.abort();
            } else if handle.task.await.is_err() {
                warn!("REST server exited abnormally")
            }
        }

        self.driver.stop(force).await;
        self.pool.stop(force).await;
        self.cache.clear().await;
        self.set_stage(Stage::Down);
        debug!("Stopped device service");
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(
        driver: Arc<dyn ProtocolDriver>,
        data: Arc<dyn CoreDataClient>,
        metadata: Arc<dyn MetadataClient>,
    ) -> Arc<DeviceService> {
        let svc = DeviceService::new("test-service", "0.0.0", driver).unwrap();

        svc.inject_clients(data, metadata);
        svc.set_stage(Stage::Full);
        svc
    }

    #[cfg(test)]
    pub(crate) fn inject_clients(
        &self,
        data: Arc<dyn CoreDataClient>,
        metadata: Arc<dyn MetadataClient>,
    ) {
        *self.data.write().unwrap() = Some(data);
        *self.metadata.write().unwrap() = Some(metadata);
    }
}

/// Pings a peer until it answers, up to `retries` attempts spaced by
/// `delay`.
async fn wait_for_peer<F, Fut>(
    what: &str,
    retries: u32,
    delay: Duration,
    ping: F,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    for attempt in 0..retries {
        match ping().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!("{} not answering ({}); will retry", what, &e)
            }
        }
        if attempt + 1 < retries {
            tokio::time::sleep(delay).await;
        }
    }
    error!("{} service not running", what);
    Err(Error::RemoteServerDown(format!("{} is not answering", what)))
}
