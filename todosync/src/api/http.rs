//! `reqwest`-backed implementation of [`TaskApi`] plus the auth, membership
//! and suggestion endpoints.

use parking_lot::RwLock;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use todosync_proto::UserId;
use todosync_proto::auth::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, Suggestion, User,
};
use todosync_proto::list::{
    CreateListInput, InviteResponse, ListId, ListMember, RemoveUserResponse, Role, TodoList,
};
use todosync_proto::task::{CreateTaskInput, Page, Task, TaskId, UpdateTaskInput};

use super::{ApiError, TaskApi};

/// Settings for [`HttpTaskApi`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL including the API prefix, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    /// `itemsPerPage` for list collections.
    pub list_page_size: u32,
    /// `itemsPerPage` for task collections.
    pub task_page_size: u32,
}

impl ApiConfig {
    /// Creates an `ApiConfig` with default page sizes.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            list_page_size: 50,
            task_page_size: 100,
        }
    }
}

/// REST client for the todo-list backend.
///
/// Attaches `Authorization: Bearer <token>` to every request once a token is
/// set. No request-level timeout is configured; the transport default applies.
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
    list_page_size: u32,
    task_page_size: u32,
    token: RwLock<Option<String>>,
}

impl HttpTaskApi {
    /// Creates a client with no token.
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            list_page_size: config.list_page_size,
            task_page_size: config.task_page_size,
            token: RwLock::new(None),
        }
    }

    /// Creates a client that authenticates with `token`.
    #[must_use]
    pub fn with_token(config: ApiConfig, token: impl Into<String>) -> Self {
        let api = Self::new(config);
        api.set_token(Some(token.into()));
        api
    }

    /// Replace (or clear) the bearer token.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    /// The current bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body, mapping non-2xx responses to
    /// [`ApiError::Status`].
    async fn request<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let err = ApiError::from_error_body(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), err = %err, "API request failed");
            return Err(err);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Like [`Self::request`] for endpoints whose success body is ignored.
    async fn request_unit(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_error_body(status.as_u16(), &body))
    }

    // --- Auth ---

    /// `POST /auth/login`. Stores the returned token on success.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the credentials are rejected or the request fails.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest { email, password };
        let response: LoginResponse = self
            .request(self.client.post(self.url("/auth/login")).json(&body))
            .await?;
        self.set_token(Some(response.token.clone()));
        tracing::info!("logged in");
        Ok(response)
    }

    /// `POST /auth/register`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if registration is rejected or the request fails.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<RegisterResponse, ApiError> {
        let body = RegisterRequest {
            email,
            password,
            first_name,
            last_name,
        };
        self.request(self.client.post(self.url("/auth/register")).json(&body))
            .await
    }

    /// `GET /auth/{user_id}`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the user cannot be read.
    pub async fn current_user(&self, user_id: UserId) -> Result<User, ApiError> {
        self.request(self.client.get(self.url(&format!("/auth/{user_id}"))))
            .await
    }

    // --- Membership ---

    /// `POST /tasks/{list_id}/invite-user?invitee_id=&role=`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the caller may not invite or the user is already a member.
    pub async fn invite_user(
        &self,
        list_id: ListId,
        invitee: UserId,
        role: Role,
    ) -> Result<InviteResponse, ApiError> {
        let builder = self
            .client
            .post(self.url(&format!("/tasks/{list_id}/invite-user")))
            .query(&[("invitee_id", invitee.0.to_string()), ("role", role.to_string())]);
        self.request(builder).await
    }

    /// `POST /tasks/{list_id}/remove-user?user_id=`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the caller may not remove or the user is not a member.
    pub async fn remove_user(
        &self,
        list_id: ListId,
        user_id: UserId,
    ) -> Result<RemoveUserResponse, ApiError> {
        let builder = self
            .client
            .post(self.url(&format!("/tasks/{list_id}/remove-user")))
            .query(&[("user_id", user_id.0)]);
        self.request(builder).await
    }

    /// `GET /tasks/{list_id}/members`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the member list cannot be read.
    pub async fn get_members(&self, list_id: ListId) -> Result<Vec<ListMember>, ApiError> {
        self.request(self.client.get(self.url(&format!("/tasks/{list_id}/members"))))
            .await
    }

    // --- AI ---

    /// `GET /ai/suggest?prefix=&context=`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the suggestion endpoint fails.
    pub async fn suggest(
        &self,
        prefix: &str,
        context: Option<&str>,
    ) -> Result<Suggestion, ApiError> {
        let mut query = vec![("prefix", prefix)];
        if let Some(context) = context {
            query.push(("context", context));
        }
        self.request(self.client.get(self.url("/ai/suggest")).query(&query))
            .await
    }
}

impl TaskApi for HttpTaskApi {
    async fn get_lists(&self, user_id: UserId, page: u32) -> Result<Page<TodoList>, ApiError> {
        let builder = self
            .client
            .get(self.url(&format!("/tasks/{user_id}/todolists")))
            .query(&[("page", page), ("itemsPerPage", self.list_page_size)]);
        self.request(builder).await
    }

    async fn get_list(&self, list_id: ListId) -> Result<TodoList, ApiError> {
        self.request(self.client.get(self.url(&format!("/tasks/{list_id}"))))
            .await
    }

    async fn create_list(&self, input: &CreateListInput) -> Result<TodoList, ApiError> {
        self.request(self.client.post(self.url("/tasks/create-list")).json(input))
            .await
    }

    async fn update_list(&self, list_id: ListId, title: &str) -> Result<TodoList, ApiError> {
        let body = CreateListInput {
            title: title.to_string(),
        };
        self.request(
            self.client
                .put(self.url(&format!("/tasks/{list_id}/update-list")))
                .json(&body),
        )
        .await
    }

    async fn delete_list(&self, list_id: ListId) -> Result<(), ApiError> {
        self.request_unit(
            self.client
                .delete(self.url(&format!("/tasks/{list_id}/delete-list"))),
        )
        .await
    }

    async fn get_tasks(&self, list_id: ListId, page: u32) -> Result<Page<Task>, ApiError> {
        let builder = self
            .client
            .get(self.url(&format!("/tasks/{list_id}/tasks")))
            .query(&[("page", page), ("itemsPerPage", self.task_page_size)]);
        self.request(builder).await
    }

    async fn get_completed_tasks(
        &self,
        list_id: ListId,
        page: u32,
    ) -> Result<Page<Task>, ApiError> {
        let builder = self
            .client
            .get(self.url(&format!("/tasks/{list_id}/tasks-completed")))
            .query(&[("page", page), ("itemsPerPage", self.task_page_size)]);
        self.request(builder).await
    }

    async fn get_starred_tasks(&self, page: u32) -> Result<Page<Task>, ApiError> {
        let builder = self
            .client
            .get(self.url("/tasks/starred-tasks"))
            .query(&[("page", page), ("itemsPerPage", self.task_page_size)]);
        self.request(builder).await
    }

    async fn create_task(&self, list_id: ListId, input: &CreateTaskInput) -> Result<Task, ApiError> {
        self.request(
            self.client
                .post(self.url(&format!("/tasks/{list_id}/add-task")))
                .json(input),
        )
        .await
    }

    async fn update_task(
        &self,
        list_id: ListId,
        task_id: TaskId,
        input: &UpdateTaskInput,
    ) -> Result<Task, ApiError> {
        self.request(
            self.client
                .put(self.url(&format!("/tasks/{list_id}/{task_id}/update-task")))
                .json(input),
        )
        .await
    }

    async fn delete_task(&self, list_id: ListId, task_id: TaskId) -> Result<(), ApiError> {
        self.request_unit(
            self.client
                .delete(self.url(&format!("/tasks/{list_id}/{task_id}/delete-task"))),
        )
        .await
    }
}
