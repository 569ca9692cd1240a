mod queries;

use std::{sync::OnceLock, time::Duration};

use anyhow::{Context, Result};
use epicsync_config::{EpicSyncConfig, ProjectRef, Repository};
use epicsync_domain::{BoardEntry, Issue, IssueType, ProjectItem, StatusField, StatusOption};
use epicsync_engine::{BoardClient, Page, PageWalker, RetryPolicy, SyncError, SyncResult};
use reqwest::{
    blocking::{Client, RequestBuilder},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

const USER_AGENT: &str = concat!("epicsync/", env!("CARGO_PKG_VERSION"));
const GRAPHQL_FEATURES: &str = "sub_issues,issue_types";
const MAX_BODY_CHARS: usize = 300;

/// [`BoardClient`] over the GitHub GraphQL API, bound to one repository, one
/// Projects (v2) board and one single-select status field.
pub struct GitHubBoard {
    graphql_url: String,
    http: Client,
    token: String,
    repository: Repository,
    project_id: String,
    status_field_name: String,
    epic_type: String,
    page_size: usize,
    retry: RetryPolicy,
    status_field: OnceLock<StatusField>,
}

#[derive(Debug, PartialEq, Eq)]
struct ItemState {
    item: ProjectItem,
    status: Option<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Clone, Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct RepositoryData<T> {
    repository: Option<IssueHolder<T>>,
}

#[derive(Deserialize)]
struct IssueHolder<T> {
    issue: Option<T>,
}

#[derive(Deserialize)]
struct NodeData<T> {
    node: Option<T>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
    #[serde(rename = "pageInfo", default)]
    page_info: PageInfo,
}

#[derive(Default, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct IssuePayload {
    number: u64,
    title: Option<String>,
    #[serde(rename = "issueType")]
    issue_type: Option<NameLike>,
}

#[derive(Default, Deserialize)]
struct NameLike {
    name: Option<String>,
}

#[derive(Deserialize)]
struct IdLike {
    id: String,
}

#[derive(Deserialize)]
struct ParentPayload {
    parent: Option<IssuePayload>,
}

#[derive(Deserialize)]
struct SubIssuesPayload {
    #[serde(rename = "subIssues")]
    sub_issues: Connection<IssuePayload>,
}

#[derive(Deserialize)]
struct IssueItemsPayload {
    #[serde(rename = "projectItems")]
    project_items: Connection<ItemPayload>,
}

#[derive(Deserialize)]
struct ItemPayload {
    id: String,
    project: Option<IdLike>,
    #[serde(rename = "fieldValueByName")]
    field_value: Option<NameLike>,
}

#[derive(Deserialize)]
struct ProjectFieldPayload {
    field: Option<FieldPayload>,
}

#[derive(Deserialize)]
struct FieldPayload {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    options: Vec<OptionPayload>,
}

#[derive(Deserialize)]
struct OptionPayload {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ProjectItemsPayload {
    items: Option<Connection<BoardItemPayload>>,
}

#[derive(Deserialize)]
struct BoardItemPayload {
    id: String,
    content: Option<ContentPayload>,
    #[serde(rename = "fieldValueByName")]
    field_value: Option<NameLike>,
}

#[derive(Default, Deserialize)]
struct ContentPayload {
    number: Option<u64>,
    title: Option<String>,
    #[serde(rename = "issueType")]
    issue_type: Option<NameLike>,
    repository: Option<RepositoryName>,
}

#[derive(Deserialize)]
struct RepositoryName {
    #[serde(rename = "nameWithOwner")]
    name_with_owner: String,
}

#[derive(Deserialize)]
struct UpdateItemPayload {
    #[serde(rename = "updateProjectV2ItemFieldValue")]
    update: Option<UpdatedItem>,
}

#[derive(Deserialize)]
struct UpdatedItem {
    #[serde(rename = "projectV2Item")]
    item: Option<IdLike>,
}

#[derive(Deserialize)]
struct OrganizationData {
    organization: Option<ProjectHolder>,
}

#[derive(Deserialize)]
struct UserData {
    user: Option<ProjectHolder>,
}

#[derive(Deserialize)]
struct ProjectHolder {
    #[serde(rename = "projectV2")]
    project: Option<IdLike>,
}

impl GitHubBoard {
    /// Builds the HTTP client and resolves the project node id. A project
    /// given by number costs one or two lookups here, before any sync work.
    pub fn from_config(config: &EpicSyncConfig) -> Result<Self> {
        let token = config.require_token()?.to_string();
        let repository = config.require_repository()?.clone();
        let project = config.require_project()?.clone();

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .with_context(|| "failed to build GitHub HTTP client")?;

        let mut board = Self {
            graphql_url: config.graphql_url(),
            http,
            token,
            repository,
            project_id: String::new(),
            status_field_name: config.status_field.clone(),
            epic_type: config.epic_type.clone(),
            page_size: config.page_size,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                initial_delay: Duration::from_millis(config.initial_backoff_ms),
                ..RetryPolicy::default()
            },
            status_field: OnceLock::new(),
        };

        board.project_id = match project {
            ProjectRef::Id(id) => id,
            ProjectRef::Number { owner, number } => board
                .lookup_project_id(&owner, number)
                .with_context(|| format!("failed to resolve project {owner}/{number}"))?,
        };
        tracing::debug!(
            project = %board.project_id,
            repository = %board.repository.full_name(),
            "github board ready"
        );
        Ok(board)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    fn lookup_project_id(&self, owner: &str, number: u64) -> SyncResult<String> {
        let variables = json!({ "login": owner, "number": number });

        let organization: OrganizationData = self.graphql(
            "organization project lookup",
            queries::ORGANIZATION_PROJECT,
            &variables,
        )?;
        if let Some(project) = organization.organization.and_then(|holder| holder.project) {
            return Ok(project.id);
        }

        let user: UserData =
            self.graphql("user project lookup", queries::USER_PROJECT, &variables)?;
        user.user
            .and_then(|holder| holder.project)
            .map(|project| project.id)
            .ok_or_else(|| {
                SyncError::Protocol(format!("no project #{number} found for owner '{owner}'"))
            })
    }

    fn graphql<T: DeserializeOwned>(
        &self,
        op: &str,
        query: &str,
        variables: &Value,
    ) -> SyncResult<T> {
        self.retry.run(op, || self.graphql_once(op, query, variables))
    }

    fn graphql_once<T: DeserializeOwned>(
        &self,
        op: &str,
        query: &str,
        variables: &Value,
    ) -> SyncResult<T> {
        let request = self
            .http
            .post(&self.graphql_url)
            .header("GraphQL-Features", GRAPHQL_FEATURES)
            .json(&json!({ "query": query, "variables": variables }));
        let response = self
            .with_auth(request)
            .send()
            .map_err(|error| SyncError::Transport(format!("{op}: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let rate_limited = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|value| value.to_str().ok())
                == Some("0");
            let body = response.text().unwrap_or_default();
            return Err(classify_status(op, status, rate_limited, &body));
        }

        let envelope: Envelope<T> = response.json().map_err(|error| {
            if error.is_timeout() {
                SyncError::Transport(format!("{op}: {error}"))
            } else {
                SyncError::Protocol(format!("{op}: invalid response body: {error}"))
            }
        })?;
        into_data(op, envelope)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    fn issue_variables(&self, number: u64) -> Value {
        json!({
            "owner": self.repository.owner,
            "repo": self.repository.name,
            "number": number,
        })
    }

    fn paged_issue_variables(&self, number: u64, cursor: Option<&str>) -> Value {
        let mut variables = self.issue_variables(number);
        variables["first"] = json!(self.page_size);
        variables["after"] = json!(cursor);
        variables
    }

    fn issue_node<T: DeserializeOwned>(
        &self,
        op: &str,
        query: &str,
        variables: Value,
        number: u64,
    ) -> SyncResult<T> {
        let data: RepositoryData<T> = self.graphql(op, query, &variables)?;
        let holder = data.repository.ok_or_else(|| {
            SyncError::Protocol(format!(
                "repository {} not found",
                self.repository.full_name()
            ))
        })?;
        holder.issue.ok_or(SyncError::NotFound { number })
    }

    fn issue_items_page(
        &self,
        number: u64,
        cursor: Option<&str>,
    ) -> SyncResult<Page<ItemPayload>> {
        let mut variables = self.paged_issue_variables(number, cursor);
        variables["fieldName"] = json!(self.status_field_name);
        let payload: IssueItemsPayload = self.issue_node(
            "project item lookup",
            queries::ISSUE_PROJECT_ITEMS,
            variables,
            number,
        )?;
        Ok(into_page(payload.project_items, |item| item))
    }

    fn find_item(&self, number: u64) -> SyncResult<Option<ItemState>> {
        let walker = PageWalker::new(move |cursor| self.issue_items_page(number, cursor));
        for next in walker {
            let payload = next.map_err(SyncError::unwrap_first_page)?;
            if let Some(state) = into_item_state(payload, &self.project_id) {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    fn status_field(&self) -> SyncResult<StatusField> {
        if let Some(field) = self.status_field.get() {
            return Ok(field.clone());
        }
        let field = self.fetch_status_field()?;
        Ok(self.status_field.get_or_init(|| field).clone())
    }

    fn fetch_status_field(&self) -> SyncResult<StatusField> {
        let variables = json!({
            "projectId": self.project_id,
            "fieldName": self.status_field_name,
        });
        let data: NodeData<ProjectFieldPayload> =
            self.graphql("status field lookup", queries::STATUS_FIELD, &variables)?;
        let payload = data.node.and_then(|node| node.field).ok_or_else(|| {
            SyncError::Protocol(format!(
                "project {} has no field named '{}'",
                self.project_id, self.status_field_name
            ))
        })?;
        let field = into_status_field(payload, &self.status_field_name)?;
        tracing::debug!(
            field = %field.name,
            options = field.options.len(),
            "loaded status field definition"
        );
        Ok(field)
    }
}

impl BoardClient for GitHubBoard {
    fn get_issue(&self, number: u64) -> SyncResult<Issue> {
        let payload: IssuePayload = self.issue_node(
            "issue lookup",
            queries::ISSUE,
            self.issue_variables(number),
            number,
        )?;
        Ok(into_issue(payload, &self.epic_type))
    }

    fn get_parent(&self, number: u64) -> SyncResult<Option<Issue>> {
        let payload: ParentPayload = self.issue_node(
            "parent lookup",
            queries::ISSUE_PARENT,
            self.issue_variables(number),
            number,
        )?;
        Ok(payload
            .parent
            .map(|parent| into_issue(parent, &self.epic_type)))
    }

    fn children_page(&self, number: u64, cursor: Option<&str>) -> SyncResult<Page<Issue>> {
        let payload: SubIssuesPayload = self.issue_node(
            "sub-issue listing",
            queries::SUB_ISSUES,
            self.paged_issue_variables(number, cursor),
            number,
        )?;
        Ok(into_page(payload.sub_issues, |child| {
            into_issue(child, &self.epic_type)
        }))
    }

    fn get_status_field_definition(&self) -> SyncResult<StatusField> {
        self.status_field()
    }

    fn get_project_item(&self, number: u64) -> SyncResult<Option<ProjectItem>> {
        Ok(self.find_item(number)?.map(|state| state.item))
    }

    fn get_current_status(&self, number: u64) -> SyncResult<Option<String>> {
        Ok(self.find_item(number)?.and_then(|state| state.status))
    }

    fn set_status(&self, number: u64, status: &str) -> SyncResult<()> {
        let field = self.status_field()?;
        let option = field
            .option(status)
            .ok_or_else(|| SyncError::UnknownStatus {
                status: status.to_string(),
                available: field.option_names(),
            })?;
        let state = self
            .find_item(number)?
            .ok_or(SyncError::NotOnBoard { number })?;

        let variables = json!({
            "projectId": self.project_id,
            "itemId": state.item.item_id,
            "fieldId": field.field_id,
            "optionId": option.option_id,
        });
        let payload: UpdateItemPayload =
            self.graphql("status update", queries::SET_SINGLE_SELECT, &variables)?;
        let item_id = confirm_write(payload, number)?;
        tracing::debug!(issue = number, status, item = %item_id, "status written");
        Ok(())
    }

    fn board_items_page(&self, cursor: Option<&str>) -> SyncResult<Page<BoardEntry>> {
        let variables = json!({
            "projectId": self.project_id,
            "first": self.page_size,
            "after": cursor,
            "fieldName": self.status_field_name,
        });
        let data: NodeData<ProjectItemsPayload> =
            self.graphql("board listing", queries::PROJECT_ITEMS, &variables)?;
        let items = data.node.and_then(|node| node.items).ok_or_else(|| {
            SyncError::Protocol(format!("project {} not found", self.project_id))
        })?;
        Ok(into_page(items, |item| {
            into_board_entry(item, &self.repository, &self.epic_type)
        }))
    }
}

fn classify_status(op: &str, status: StatusCode, rate_limited: bool, body: &str) -> SyncError {
    let detail = format!(
        "{op} failed: status={} body={}",
        status,
        compact_body(body)
    );
    if status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        || (status == StatusCode::FORBIDDEN && rate_limited)
    {
        SyncError::Transport(detail)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        SyncError::Unauthorized(detail)
    } else {
        SyncError::Protocol(detail)
    }
}

/// NOT_FOUND errors come with partial data where the missing node is null;
/// those are left for the caller to interpret. Any other error fails the call.
fn into_data<T>(op: &str, envelope: Envelope<T>) -> SyncResult<T> {
    let Envelope { data, errors } = envelope;
    if let Some(error) = classify_graphql_errors(op, &errors) {
        return Err(error);
    }
    data.ok_or_else(|| {
        let reason = errors
            .first()
            .map_or("response carried no data", |error| error.message.as_str());
        SyncError::Protocol(format!("{op}: {reason}"))
    })
}

fn classify_graphql_errors(op: &str, errors: &[GraphqlError]) -> Option<SyncError> {
    let blocking = errors
        .iter()
        .filter(|error| error.kind.as_deref() != Some("NOT_FOUND"))
        .collect::<Vec<_>>();
    let first = blocking.first()?;
    let messages = blocking
        .iter()
        .map(|error| error.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    let detail = format!("{op}: {messages}");

    Some(match first.kind.as_deref() {
        Some("FORBIDDEN") | Some("INSUFFICIENT_SCOPES") => SyncError::Unauthorized(detail),
        Some("RATE_LIMITED") => SyncError::Transport(detail),
        _ => SyncError::Protocol(detail),
    })
}

/// A null mutation result means the item vanished before the write landed.
fn confirm_write(payload: UpdateItemPayload, number: u64) -> SyncResult<String> {
    payload
        .update
        .and_then(|update| update.item)
        .map(|item| item.id)
        .ok_or(SyncError::NotOnBoard { number })
}

fn into_page<T, U>(connection: Connection<T>, map: impl FnMut(T) -> U) -> Page<U> {
    let items = connection.nodes.into_iter().flatten().map(map).collect();
    let PageInfo {
        has_next_page,
        end_cursor,
    } = connection.page_info;
    match (has_next_page, end_cursor) {
        (true, Some(cursor)) => Page::more(items, cursor),
        // Left for the walker to reject.
        (true, None) => Page {
            items,
            next_cursor: None,
            has_more: true,
        },
        (false, _) => Page::last(items),
    }
}

fn into_issue(payload: IssuePayload, epic_type: &str) -> Issue {
    let type_name = payload.issue_type.and_then(name_like);
    Issue {
        number: payload.number,
        title: payload.title.and_then(non_empty).unwrap_or_default(),
        issue_type: IssueType::from_name(type_name.as_deref(), epic_type),
    }
}

fn into_item_state(payload: ItemPayload, project_id: &str) -> Option<ItemState> {
    let item_project = payload.project?.id;
    if item_project != project_id {
        return None;
    }
    Some(ItemState {
        item: ProjectItem {
            item_id: payload.id,
            project_id: item_project,
        },
        status: payload.field_value.and_then(name_like),
    })
}

fn into_status_field(payload: FieldPayload, requested: &str) -> SyncResult<StatusField> {
    let field_id = payload.id.and_then(non_empty).ok_or_else(|| {
        SyncError::Protocol(format!("field '{requested}' is not a single-select field"))
    })?;
    Ok(StatusField {
        field_id,
        name: payload
            .name
            .and_then(non_empty)
            .unwrap_or_else(|| requested.to_string()),
        options: payload
            .options
            .into_iter()
            .map(|option| StatusOption {
                option_id: option.id,
                name: option.name,
            })
            .collect(),
    })
}

fn into_board_entry(
    payload: BoardItemPayload,
    repository: &Repository,
    epic_type: &str,
) -> BoardEntry {
    let full_name = repository.full_name();
    let issue = payload.content.and_then(|content| {
        let number = content.number?;
        let home = content.repository?;
        if !home.name_with_owner.eq_ignore_ascii_case(&full_name) {
            return None;
        }
        let type_name = content.issue_type.and_then(name_like);
        Some(Issue {
            number,
            title: content.title.and_then(non_empty).unwrap_or_default(),
            issue_type: IssueType::from_name(type_name.as_deref(), epic_type),
        })
    });

    BoardEntry {
        item_id: payload.id,
        issue,
        status: payload.field_value.and_then(name_like),
    }
}

fn name_like(value: NameLike) -> Option<String> {
    value.name.and_then(non_empty)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn compact_body(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_BODY_CHARS {
        return flat;
    }
    let mut cut = flat.chars().take(MAX_BODY_CHARS).collect::<String>();
    cut.push_str("...");
    cut
}
