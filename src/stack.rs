use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{Capability, ChangeSetType, Parameter, Tag};
use chrono::Utc;

use crate::parameters::ResolvedParameter;

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed.";
const EMPTY_CHANGE_SET_PREFIX: &str = "The submitted information didn't contain changes.";
const DOES_NOT_EXIST_SUFFIX: &str = "does not exist";
const CHANGE_SET_NAME_FORMAT: &str = "C-%Y-%m-%d-%H%M%SZ";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error occurred: {0}")]
    ServiceError(String),

    #[error("Unknown error occurred: {0}")]
    UnknownError(String),

    #[error("Stack {0} not found")]
    NotFoundError(String),

    #[error("Stack {0} has no changes to apply")]
    NoUpdates(String),

    #[error("Stack {0} finished in status {1}: {2}")]
    OperationFailed(String, String, String),

    #[error("Change set {0} contains no changes: {1}")]
    EmptyChangeSet(String, String),

    #[error("Change set {0} finished in status {1}: {2}")]
    ChangeSetFailed(String, String, String),

    #[error("Gave up waiting for {0} after {1} status checks")]
    Timeout(String, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    CreateOrUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_url: String,
    pub parameters: Vec<ResolvedParameter>,
    pub tags: BTreeMap<String, String>,
    pub role_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackState {
    pub status: String,
    pub reason: Option<String>,
}

/// Identifiers CloudFormation hands back for a new change set.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub stack_id: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(String),
    Updated(String),
    /// A change set is ready for review in the console at this URL.
    ChangeSetCreated(String),
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitConfig {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        return Self {
            delay: Duration::from_secs(3),
            max_attempts: 200,
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployOptions {
    pub action: Action,
    pub wait: Option<WaitConfig>,
    pub ignore_empty_updates: bool,
    /// Create a change set for review instead of applying the template.
    pub change_set: bool,
    /// Region of the stack, used for console links.
    pub region: String,
}

#[async_trait]
pub trait StackApi {
    async fn validate_template(&self, template_url: &str) -> Result<(), Error>;

    /// `None` when no live stack carries the name.
    async fn describe_stack(&self, stack_name: &str) -> Result<Option<StackState>, Error>;

    async fn create_stack(&self, request: &StackRequest) -> Result<String, Error>;

    async fn update_stack(&self, request: &StackRequest) -> Result<String, Error>;

    async fn create_change_set(
        &self,
        request: &StackRequest,
        change_set_name: &str,
        operation: Operation,
    ) -> Result<ChangeSet, Error>;

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<StackState, Error>;

    async fn delete_change_set(&self, stack_name: &str, change_set_name: &str)
        -> Result<(), Error>;
}

fn sdk_error<E, R>(error: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if let Some(service_error) = error.as_service_error() {
        let message = service_error
            .message()
            .or(service_error.code())
            .unwrap_or("unknown service error");
        return Error::ServiceError(message.to_string());
    }
    return Error::UnknownError(DisplayErrorContext(&error).to_string());
}

pub struct CloudFormation {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormation {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        return Self {
            client: aws_sdk_cloudformation::Client::new(sdk_config),
        };
    }

    fn parameters(request: &StackRequest) -> Vec<Parameter> {
        return request
            .parameters
            .iter()
            .map(|parameter| {
                Parameter::builder()
                    .parameter_key(&parameter.key)
                    .parameter_value(&parameter.value)
                    .build()
            })
            .collect();
    }

    fn tags(request: &StackRequest) -> Result<Vec<Tag>, Error> {
        return request
            .tags
            .iter()
            .map(|(key, value)| {
                Ok(Tag::builder().key(key).value(value).build())
            })
            .collect();
    }

    fn capabilities() -> Vec<Capability> {
        return vec![
            Capability::CapabilityIam,
            Capability::CapabilityNamedIam,
            Capability::CapabilityAutoExpand,
        ];
    }
}

#[async_trait]
impl StackApi for CloudFormation {
    async fn validate_template(&self, template_url: &str) -> Result<(), Error> {
        let result = self
            .client
            .validate_template()
            .template_url(template_url)
            .send()
            .await;

        return match result {
            Ok(_) => Ok(()),
            Err(error) => Err(sdk_error(error)),
        };
    }

    async fn describe_stack(&self, stack_name: &str) -> Result<Option<StackState>, Error> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            // The error code is a generic "ValidationError", only the message tells
            // a missing stack apart.
            Err(error) => match sdk_error(error) {
                Error::ServiceError(message) if message.ends_with(DOES_NOT_EXIST_SUFFIX) => {
                    return Ok(None)
                }
                other => return Err(other),
            },
        };

        let stack = match result.stacks().first() {
            Some(stack) => stack,
            None => return Ok(None),
        };

        return Ok(Some(StackState {
            status: stack
                .stack_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            reason: stack.stack_status_reason().map(str::to_string),
        }));
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<String, Error> {
        let result = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_url(&request.template_url)
            .set_parameters(Some(Self::parameters(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_capabilities(Some(Self::capabilities()))
            .set_role_arn(request.role_arn.clone())
            .send()
            .await;

        return match result {
            Ok(data) => Ok(data.stack_id().unwrap_or_default().to_string()),
            Err(error) => Err(sdk_error(error)),
        };
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<String, Error> {
        let result = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .template_url(&request.template_url)
            .set_parameters(Some(Self::parameters(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_capabilities(Some(Self::capabilities()))
            .set_role_arn(request.role_arn.clone())
            .send()
            .await;

        return match result {
            Ok(data) => Ok(data.stack_id().unwrap_or_default().to_string()),
            Err(error) => match sdk_error(error) {
                Error::ServiceError(message) if message == NO_UPDATES_MESSAGE => {
                    Err(Error::NoUpdates(request.stack_name.clone()))
                }
                other => Err(other),
            },
        };
    }

    async fn create_change_set(
        &self,
        request: &StackRequest,
        change_set_name: &str,
        operation: Operation,
    ) -> Result<ChangeSet, Error> {
        let change_set_type = match operation {
            Operation::Create => ChangeSetType::Create,
            Operation::Update => ChangeSetType::Update,
        };

        let result = self
            .client
            .create_change_set()
            .stack_name(&request.stack_name)
            .change_set_name(change_set_name)
            .change_set_type(change_set_type)
            .template_url(&request.template_url)
            .set_parameters(Some(Self::parameters(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_capabilities(Some(Self::capabilities()))
            .set_role_arn(request.role_arn.clone())
            .send()
            .await;

        return match result {
            Ok(data) => Ok(ChangeSet {
                stack_id: data.stack_id().unwrap_or_default().to_string(),
                id: data.id().unwrap_or_default().to_string(),
            }),
            Err(error) => Err(sdk_error(error)),
        };
    }

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<StackState, Error> {
        let result = self
            .client
            .describe_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await;

        return match result {
            Ok(data) => Ok(StackState {
                status: data
                    .status()
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default(),
                reason: data.status_reason().map(str::to_string),
            }),
            Err(error) => Err(sdk_error(error)),
        };
    }

    async fn delete_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<(), Error> {
        let result = self
            .client
            .delete_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await;

        return match result {
            Ok(_) => Ok(()),
            Err(error) => Err(sdk_error(error)),
        };
    }
}

/// Change set names must start with a letter and cannot contain colons.
pub fn change_set_name() -> String {
    return Utc::now().format(CHANGE_SET_NAME_FORMAT).to_string();
}

/// Console page showing the changes in a change set.
pub fn change_set_console_url(region: &str, stack_id: &str, change_set_id: &str) -> String {
    let encode = |arn: &str| url::form_urlencoded::byte_serialize(arn.as_bytes()).collect::<String>();
    return format!(
        "https://console.aws.amazon.com/cloudformation/home?region={}#/stacks/{}/changesets/{}/changes",
        region,
        encode(stack_id),
        encode(change_set_id)
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    InProgress,
    Succeeded,
    Failed,
}

pub fn classify_status(status: &str) -> StatusClass {
    if status.ends_with("_IN_PROGRESS") {
        return StatusClass::InProgress;
    }
    if status.ends_with("_FAILED") || status.contains("ROLLBACK") || status == "DELETE_COMPLETE" {
        return StatusClass::Failed;
    }
    if status.ends_with("_COMPLETE") {
        return StatusClass::Succeeded;
    }
    return StatusClass::Failed;
}

pub async fn wait_for_completion<A>(
    api: &A,
    stack_name: &str,
    config: WaitConfig,
) -> Result<StackState, Error>
where
    A: StackApi + ?Sized,
{
    for attempt in 1..=config.max_attempts {
        let state = match api.describe_stack(stack_name).await? {
            Some(state) => state,
            None => return Err(Error::NotFoundError(stack_name.to_string())),
        };

        match classify_status(&state.status) {
            StatusClass::Succeeded => return Ok(state),
            StatusClass::Failed => {
                return Err(Error::OperationFailed(
                    stack_name.to_string(),
                    state.status,
                    state.reason.unwrap_or_default(),
                ))
            }
            StatusClass::InProgress => {
                tracing::debug!(stack = stack_name, status = %state.status, attempt, "waiting");
                tokio::time::sleep(config.delay).await;
            }
        }
    }

    return Err(Error::Timeout(stack_name.to_string(), config.max_attempts));
}

/// Polls until the change set is ready. A change set that failed because the
/// template changes nothing comes back as `EmptyChangeSet`.
pub async fn wait_for_change_set<A>(
    api: &A,
    stack_name: &str,
    change_set_name: &str,
    config: WaitConfig,
) -> Result<(), Error>
where
    A: StackApi + ?Sized,
{
    for attempt in 1..=config.max_attempts {
        let state = api.describe_change_set(stack_name, change_set_name).await?;
        let reason = state.reason.unwrap_or_default();

        match state.status.as_str() {
            "CREATE_COMPLETE" => return Ok(()),
            "CREATE_PENDING" | "CREATE_IN_PROGRESS" => {
                tracing::debug!(change_set = change_set_name, status = %state.status, attempt, "waiting");
                tokio::time::sleep(config.delay).await;
            }
            "FAILED" if reason.starts_with(EMPTY_CHANGE_SET_PREFIX) => {
                return Err(Error::EmptyChangeSet(change_set_name.to_string(), reason))
            }
            _ => {
                return Err(Error::ChangeSetFailed(
                    change_set_name.to_string(),
                    state.status,
                    reason,
                ))
            }
        }
    }

    return Err(Error::Timeout(change_set_name.to_string(), config.max_attempts));
}

async fn apply_change_set<A>(
    api: &A,
    request: &StackRequest,
    operation: Operation,
    options: &DeployOptions,
) -> Result<Outcome, Error>
where
    A: StackApi + ?Sized,
{
    let name = change_set_name();
    tracing::info!(stack = %request.stack_name, change_set = %name, ?operation, "creating change set");
    let change_set = api.create_change_set(request, &name, operation).await?;

    if let Some(wait) = options.wait {
        match wait_for_change_set(api, &request.stack_name, &name, wait).await {
            Ok(()) => {}
            Err(Error::EmptyChangeSet(..)) if options.ignore_empty_updates => {
                tracing::info!(change_set = %name, "change set contains no changes, deleting");
                api.delete_change_set(&request.stack_name, &name).await?;
                return Ok(Outcome::Unchanged);
            }
            Err(error) => return Err(error),
        }
    }

    let console_url = change_set_console_url(&options.region, &change_set.stack_id, &change_set.id);
    return Ok(Outcome::ChangeSetCreated(console_url));
}

/// Validates the uploaded template and issues exactly one create or update
/// call, or one change set of that type. `CreateOrUpdate` picks the kind by
/// checking whether the stack exists.
pub async fn deploy<A>(
    api: &A,
    request: &StackRequest,
    options: &DeployOptions,
) -> Result<Outcome, Error>
where
    A: StackApi + ?Sized,
{
    api.validate_template(&request.template_url).await?;

    let operation = match options.action {
        Action::Create => Operation::Create,
        Action::Update => Operation::Update,
        Action::CreateOrUpdate => match api.describe_stack(&request.stack_name).await? {
            Some(_) => Operation::Update,
            None => Operation::Create,
        },
    };

    if options.change_set {
        return apply_change_set(api, request, operation, options).await;
    }

    let outcome = match operation {
        Operation::Create => {
            tracing::info!(stack = %request.stack_name, "creating stack");
            Outcome::Created(api.create_stack(request).await?)
        }
        Operation::Update => {
            tracing::info!(stack = %request.stack_name, "updating stack");
            match api.update_stack(request).await {
                Ok(stack_id) => Outcome::Updated(stack_id),
                Err(Error::NoUpdates(_)) if options.ignore_empty_updates => {
                    tracing::info!(stack = %request.stack_name, "template contains no changes");
                    return Ok(Outcome::Unchanged);
                }
                Err(error) => return Err(error),
            }
        }
    };

    if let Some(wait) = options.wait {
        let state = wait_for_completion(api, &request.stack_name, wait).await?;
        tracing::info!(stack = %request.stack_name, status = %state.status, "stack operation finished");
    }

    return Ok(outcome);
}

#[cfg(test)]
pub mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::{
        change_set_console_url, change_set_name, classify_status, deploy, wait_for_completion,
        Action, ChangeSet, DeployOptions, Error, Operation, Outcome, StackApi, StackRequest,
        StackState, StatusClass, WaitConfig,
    };

    pub const STACK_ID: &str = "arn:aws:cloudformation:eu-west-1:1:stack/api/guid";
    pub const CHANGE_SET_ID: &str = "arn:aws:cloudformation:eu-west-1:1:changeSet/C-1/guid";
    const EMPTY_REASON: &str = "The submitted information didn't contain changes. \
        Submit different information to create a change set.";

    #[derive(Default)]
    pub struct FakeStackApi {
        pub exists: bool,
        pub no_changes: bool,
        pub statuses: Mutex<VecDeque<&'static str>>,
        pub calls: Mutex<Vec<String>>,
        pub requests: Mutex<Vec<StackRequest>>,
        pub change_sets: Mutex<Vec<(String, Operation)>>,
    }

    impl FakeStackApi {
        pub fn calls(&self) -> Vec<String> {
            return self.calls.lock().unwrap().clone();
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl StackApi for FakeStackApi {
        async fn validate_template(&self, _template_url: &str) -> Result<(), Error> {
            self.record("validate");
            return Ok(());
        }

        async fn describe_stack(&self, _stack_name: &str) -> Result<Option<StackState>, Error> {
            self.record("describe");
            if let Some(status) = self.statuses.lock().unwrap().pop_front() {
                return Ok(Some(StackState {
                    status: status.to_string(),
                    reason: Some(String::from("because")),
                }));
            }
            if self.exists {
                return Ok(Some(StackState {
                    status: String::from("CREATE_COMPLETE"),
                    reason: None,
                }));
            }
            return Ok(None);
        }

        async fn create_stack(&self, request: &StackRequest) -> Result<String, Error> {
            self.record("create");
            self.requests.lock().unwrap().push(request.clone());
            return Ok(String::from("arn:stack/created"));
        }

        async fn update_stack(&self, request: &StackRequest) -> Result<String, Error> {
            self.record("update");
            self.requests.lock().unwrap().push(request.clone());
            if self.no_changes {
                return Err(Error::NoUpdates(request.stack_name.clone()));
            }
            return Ok(String::from("arn:stack/updated"));
        }

        async fn create_change_set(
            &self,
            request: &StackRequest,
            change_set_name: &str,
            operation: Operation,
        ) -> Result<ChangeSet, Error> {
            self.record("create_change_set");
            self.requests.lock().unwrap().push(request.clone());
            self.change_sets
                .lock()
                .unwrap()
                .push((change_set_name.to_string(), operation));
            return Ok(ChangeSet {
                stack_id: String::from(STACK_ID),
                id: String::from(CHANGE_SET_ID),
            });
        }

        async fn describe_change_set(
            &self,
            _stack_name: &str,
            _change_set_name: &str,
        ) -> Result<StackState, Error> {
            self.record("describe_change_set");
            if self.no_changes {
                return Ok(StackState {
                    status: String::from("FAILED"),
                    reason: Some(String::from(EMPTY_REASON)),
                });
            }
            return Ok(StackState {
                status: String::from("CREATE_COMPLETE"),
                reason: None,
            });
        }

        async fn delete_change_set(
            &self,
            _stack_name: &str,
            _change_set_name: &str,
        ) -> Result<(), Error> {
            self.record("delete_change_set");
            return Ok(());
        }
    }

    fn request() -> StackRequest {
        return StackRequest {
            stack_name: String::from("api"),
            template_url: String::from("https://s3.amazonaws.com/b/api/api.yaml"),
            parameters: Vec::new(),
            tags: BTreeMap::new(),
            role_arn: None,
        };
    }

    fn options(action: Action) -> DeployOptions {
        return DeployOptions {
            action,
            wait: None,
            ignore_empty_updates: false,
            change_set: false,
            region: String::from("eu-west-1"),
        };
    }

    fn fast_wait() -> WaitConfig {
        return WaitConfig {
            delay: Duration::ZERO,
            max_attempts: 3,
        };
    }

    #[tokio::test]
    async fn creates_when_the_stack_does_not_exist() {
        let api = FakeStackApi::default();

        let outcome = deploy(&api, &request(), &options(Action::CreateOrUpdate))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Created(String::from("arn:stack/created")));
        assert_eq!(api.calls(), vec!["validate", "describe", "create"]);
    }

    #[tokio::test]
    async fn updates_when_the_stack_exists() {
        let api = FakeStackApi {
            exists: true,
            ..Default::default()
        };

        let outcome = deploy(&api, &request(), &options(Action::CreateOrUpdate))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Updated(String::from("arn:stack/updated")));
        assert_eq!(api.calls(), vec!["validate", "describe", "update"]);
    }

    #[tokio::test]
    async fn explicit_actions_skip_the_existence_check() {
        let api = FakeStackApi::default();
        deploy(&api, &request(), &options(Action::Update)).await.unwrap();
        deploy(&api, &request(), &options(Action::Create)).await.unwrap();

        assert_eq!(api.calls(), vec!["validate", "update", "validate", "create"]);
    }

    #[tokio::test]
    async fn empty_updates_fail_unless_ignored() {
        let api = FakeStackApi {
            exists: true,
            no_changes: true,
            ..Default::default()
        };

        let result = deploy(&api, &request(), &options(Action::Update)).await;
        assert_eq!(result, Err(Error::NoUpdates(String::from("api"))));

        let mut ignoring = options(Action::Update);
        ignoring.ignore_empty_updates = true;
        let outcome = deploy(&api, &request(), &ignoring).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
    }

    #[tokio::test]
    async fn waits_until_the_stack_settles() {
        let api = FakeStackApi::default();
        api.statuses
            .lock()
            .unwrap()
            .extend(["CREATE_IN_PROGRESS", "CREATE_IN_PROGRESS", "CREATE_COMPLETE"]);

        let mut waiting = options(Action::Create);
        waiting.wait = Some(fast_wait());
        deploy(&api, &request(), &waiting).await.unwrap();

        assert_eq!(
            api.calls(),
            vec!["validate", "create", "describe", "describe", "describe"]
        );
    }

    #[tokio::test]
    async fn rollback_is_reported_as_failure() {
        let api = FakeStackApi::default();
        api.statuses
            .lock()
            .unwrap()
            .extend(["UPDATE_IN_PROGRESS", "UPDATE_ROLLBACK_COMPLETE"]);

        let result = wait_for_completion(&api, "api", fast_wait()).await;
        assert_eq!(
            result,
            Err(Error::OperationFailed(
                String::from("api"),
                String::from("UPDATE_ROLLBACK_COMPLETE"),
                String::from("because"),
            ))
        );
    }

    #[tokio::test]
    async fn waiting_gives_up_after_max_attempts() {
        let api = FakeStackApi::default();
        api.statuses
            .lock()
            .unwrap()
            .extend(["CREATE_IN_PROGRESS"; 5]);

        let result = wait_for_completion(&api, "api", fast_wait()).await;
        assert_eq!(result, Err(Error::Timeout(String::from("api"), 3)));
    }

    #[tokio::test]
    async fn change_set_replaces_the_update_call() {
        let api = FakeStackApi {
            exists: true,
            ..Default::default()
        };
        let mut reviewing = options(Action::CreateOrUpdate);
        reviewing.change_set = true;

        let outcome = deploy(&api, &request(), &reviewing).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::ChangeSetCreated(change_set_console_url("eu-west-1", STACK_ID, CHANGE_SET_ID))
        );
        assert_eq!(api.calls(), vec!["validate", "describe", "create_change_set"]);
        assert_eq!(api.change_sets.lock().unwrap()[0].1, Operation::Update);
    }

    #[tokio::test]
    async fn change_set_for_a_new_stack_is_a_create_change_set() {
        let api = FakeStackApi::default();
        let mut reviewing = options(Action::CreateOrUpdate);
        reviewing.change_set = true;
        reviewing.wait = Some(fast_wait());

        deploy(&api, &request(), &reviewing).await.unwrap();

        assert_eq!(
            api.calls(),
            vec!["validate", "describe", "create_change_set", "describe_change_set"]
        );
        let change_sets = api.change_sets.lock().unwrap();
        assert_eq!(change_sets[0].1, Operation::Create);
        assert!(change_sets[0].0.starts_with("C-"));
    }

    #[tokio::test]
    async fn empty_change_sets_fail_unless_ignored() {
        let api = FakeStackApi {
            exists: true,
            no_changes: true,
            ..Default::default()
        };
        let mut reviewing = options(Action::Update);
        reviewing.change_set = true;
        reviewing.wait = Some(fast_wait());

        match deploy(&api, &request(), &reviewing).await {
            Err(Error::EmptyChangeSet(_, reason)) => assert_eq!(reason, EMPTY_REASON),
            other => panic!("Expected `EmptyChangeSet` error, got {:?}", other),
        }
        assert!(!api.calls().contains(&String::from("delete_change_set")));

        reviewing.ignore_empty_updates = true;
        let outcome = deploy(&api, &request(), &reviewing).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(api.calls().last().map(String::as_str), Some("delete_change_set"));
    }

    #[test]
    fn change_set_names_are_timestamps() {
        let name = change_set_name();
        assert_eq!(name.len(), "C-2024-01-02-030405Z".len());
        assert!(name.starts_with("C-"));
        assert!(name.ends_with('Z'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn console_url_escapes_the_arns() {
        assert_eq!(
            change_set_console_url("eu-west-1", STACK_ID, CHANGE_SET_ID),
            "https://console.aws.amazon.com/cloudformation/home?region=eu-west-1#/stacks/\
             arn%3Aaws%3Acloudformation%3Aeu-west-1%3A1%3Astack%2Fapi%2Fguid/changesets/\
             arn%3Aaws%3Acloudformation%3Aeu-west-1%3A1%3AchangeSet%2FC-1%2Fguid/changes"
        );
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status("CREATE_COMPLETE"), StatusClass::Succeeded);
        assert_eq!(classify_status("UPDATE_COMPLETE"), StatusClass::Succeeded);
        assert_eq!(classify_status("REVIEW_IN_PROGRESS"), StatusClass::InProgress);
        assert_eq!(
            classify_status("UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"),
            StatusClass::InProgress
        );
        assert_eq!(classify_status("ROLLBACK_COMPLETE"), StatusClass::Failed);
        assert_eq!(classify_status("CREATE_FAILED"), StatusClass::Failed);
    }
}
