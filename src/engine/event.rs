//! Inbound events and the typed set of button actions
//!
//! Button tokens are decoded exactly once, at the transport edge, by
//! [`CallbackAction::parse`]. Everything past that point matches on variants.

use std::fmt;

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Chat the event came from and replies go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram user that produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound occurrence. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub update_id: u64,
    pub user: UserId,
    pub chat: ChatId,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `/name args`; the name is lowercase without the leading slash or `@bot` suffix
    Command { name: String, args: String },
    /// Free text that is not a command
    Text { content: String },
    /// Inline button press
    Callback {
        action: CallbackAction,
        message_ref: Option<i32>,
    },
}

impl Event {
    pub fn command(chat: ChatId, user: UserId, name: &str, args: &str) -> Self {
        Self {
            update_id: 0,
            user,
            chat,
            payload: Payload::Command {
                name: name.to_lowercase(),
                args: args.trim().to_string(),
            },
        }
    }

    pub fn text(chat: ChatId, user: UserId, content: &str) -> Self {
        Self {
            update_id: 0,
            user,
            chat,
            payload: Payload::Text {
                content: content.to_string(),
            },
        }
    }

    pub fn callback(chat: ChatId, user: UserId, action: CallbackAction) -> Self {
        Self {
            update_id: 0,
            user,
            chat,
            payload: Payload::Callback {
                action,
                message_ref: None,
            },
        }
    }

    /// Builds a `Command` or `Text` event from raw message text.
    pub fn from_message(update_id: u64, chat: ChatId, user: UserId, text: &str) -> Self {
        let payload = match parse_command(text) {
            Some((name, args)) => Payload::Command { name, args },
            None => Payload::Text {
                content: text.to_string(),
            },
        };
        Self {
            update_id,
            user,
            chat,
            payload,
        }
    }

    pub fn with_update_id(mut self, update_id: u64) -> Self {
        self.update_id = update_id;
        self
    }

    pub fn with_message_ref(mut self, message_ref: i32) -> Self {
        if let Payload::Callback { message_ref: slot, .. } = &mut self.payload {
            *slot = Some(message_ref);
        }
        self
    }

    pub fn command_name(&self) -> Option<&str> {
        match &self.payload {
            Payload::Command { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn command_args(&self) -> &str {
        match &self.payload {
            Payload::Command { args, .. } => args,
            _ => "",
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn action(&self) -> Option<&CallbackAction> {
        match &self.payload {
            Payload::Callback { action, .. } => Some(action),
            _ => None,
        }
    }

    /// Human-readable form of what the user sent, for diagnostics.
    pub fn describe(&self) -> String {
        match &self.payload {
            Payload::Command { name, args } if args.is_empty() => format!("/{}", name),
            Payload::Command { name, args } => format!("/{} {}", name, args),
            Payload::Text { content } => content.clone(),
            Payload::Callback { action, .. } => format!("[button] {}", action.token()),
        }
    }
}

/// Splits `/name@bot args` into `("name", "args")`.
fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name.to_lowercase(), args.to_string()))
}

/// Staff roles selectable during onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum StaffRole {
    Barista,
    Manager,
    Admin,
}

impl StaffRole {
    pub fn label(&self) -> &'static str {
        match self {
            StaffRole::Barista => "☕ Бариста",
            StaffRole::Manager => "📋 Менеджер",
            StaffRole::Admin => "👑 Администратор",
        }
    }

    /// Managers and admins see client management and statistics
    pub fn can_manage(&self) -> bool {
        matches!(self, StaffRole::Manager | StaffRole::Admin)
    }
}

/// Statistics screens reachable from the stats menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StatsView {
    Today,
    Week,
    Month,
    TopClients,
}

/// Admin panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AdminAction {
    StaffManagement,
    AdminStats,
    ListStaff,
    ForceBirthdayCheck,
    Promotions,
    SystemSettings,
    BackupData,
}

/// Every button the bot renders. Unrecognised tokens decode to `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    RegisterClient,
    RegisterSelf,
    AddStaff,
    ConfirmRegistration,
    CancelRegistration,
    ConfirmSelfRegistration,
    CancelSelfRegistration,
    Confirm,
    Cancel,
    Role(StaffRole),
    AddPointsFor(i64),
    SpendPointsFor(i64),
    StartAddPoints,
    StartSpendPoints,
    StartPurchase,
    SearchClient,
    AboutLoyalty,
    BackToStart,
    ManageClients,
    ListAllClients,
    ManageClient(i64),
    BonusOperations,
    Statistics,
    Stats(StatsView),
    Admin(AdminAction),
    SendBirthdayBonuses,
    ConfirmDelete(i64),
    CancelDelete,
    Unknown(String),
}

impl CallbackAction {
    /// Decodes a button token. Exact tokens win over prefixed ones.
    pub fn parse(token: &str) -> Self {
        use CallbackAction::*;

        let exact = match token {
            "register_client" => Some(RegisterClient),
            "register_self" => Some(RegisterSelf),
            "add_staff" => Some(AddStaff),
            "confirm_registration" => Some(ConfirmRegistration),
            "cancel_registration" => Some(CancelRegistration),
            "confirm_self_registration" => Some(ConfirmSelfRegistration),
            "cancel_self_registration" => Some(CancelSelfRegistration),
            "confirm" => Some(Confirm),
            "cancel" => Some(Cancel),
            "start_add_points" => Some(StartAddPoints),
            "start_spend_points" => Some(StartSpendPoints),
            "start_purchase" => Some(StartPurchase),
            "search_client" => Some(SearchClient),
            "about_loyalty" => Some(AboutLoyalty),
            "back_to_start" => Some(BackToStart),
            "manage_clients" => Some(ManageClients),
            "list_all_clients" => Some(ListAllClients),
            "bonus_operations" => Some(BonusOperations),
            "statistics" => Some(Statistics),
            "send_birthday_bonuses" => Some(SendBirthdayBonuses),
            "cancel_delete" => Some(CancelDelete),
            _ => None,
        };
        if let Some(action) = exact {
            return action;
        }
        if let Ok(admin) = token.parse::<AdminAction>() {
            return Admin(admin);
        }

        let with_id = |prefix: &str| token.strip_prefix(prefix).and_then(|id| id.parse::<i64>().ok());
        if let Some(id) = with_id("add_points_") {
            return AddPointsFor(id);
        }
        if let Some(id) = with_id("spend_points_") {
            return SpendPointsFor(id);
        }
        if let Some(id) = with_id("manage_client_") {
            return ManageClient(id);
        }
        if let Some(id) = with_id("confirm_delete_") {
            return ConfirmDelete(id);
        }
        if let Some(role) = token.strip_prefix("role_").and_then(|r| r.parse::<StaffRole>().ok()) {
            return Role(role);
        }
        if let Some(view) = token.strip_prefix("stats_").and_then(|v| v.parse::<StatsView>().ok()) {
            return Stats(view);
        }

        Unknown(token.to_string())
    }

    /// Encodes the action as a button token; `parse(token())` round-trips.
    pub fn token(&self) -> String {
        use CallbackAction::*;

        match self {
            RegisterClient => "register_client".to_string(),
            RegisterSelf => "register_self".to_string(),
            AddStaff => "add_staff".to_string(),
            ConfirmRegistration => "confirm_registration".to_string(),
            CancelRegistration => "cancel_registration".to_string(),
            ConfirmSelfRegistration => "confirm_self_registration".to_string(),
            CancelSelfRegistration => "cancel_self_registration".to_string(),
            Confirm => "confirm".to_string(),
            Cancel => "cancel".to_string(),
            Role(role) => format!("role_{}", role),
            AddPointsFor(id) => format!("add_points_{}", id),
            SpendPointsFor(id) => format!("spend_points_{}", id),
            StartAddPoints => "start_add_points".to_string(),
            StartSpendPoints => "start_spend_points".to_string(),
            StartPurchase => "start_purchase".to_string(),
            SearchClient => "search_client".to_string(),
            AboutLoyalty => "about_loyalty".to_string(),
            BackToStart => "back_to_start".to_string(),
            ManageClients => "manage_clients".to_string(),
            ListAllClients => "list_all_clients".to_string(),
            ManageClient(id) => format!("manage_client_{}", id),
            BonusOperations => "bonus_operations".to_string(),
            Statistics => "statistics".to_string(),
            Stats(view) => format!("stats_{}", view),
            Admin(action) => action.to_string(),
            SendBirthdayBonuses => "send_birthday_bonuses".to_string(),
            ConfirmDelete(id) => format!("confirm_delete_{}", id),
            CancelDelete => "cancel_delete".to_string(),
            Unknown(token) => token.clone(),
        }
    }
}
