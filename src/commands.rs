//! Command parsing and the name → handler table.
//!
//! Handlers only render replies; sending them and dispatching leads is left
//! to the bot runtime.

use teloxide::types::{BotCommand, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

use crate::bot::AppState;

/// Source tag recorded when `/start` carries no argument.
pub const UNKNOWN_SOURCE: &str = "unknown";

const CTA_TEXT: &str = "Щоб зв'язатись з нашим менеджером, натискай кнопку нижче 👇🏼";

const CTA_BUTTONS: [(&str, &str); 2] = [
    (
        "Дізнатися вартість моєї роботи 📚",
        "Я хочу дізнатись вартість моєї роботи!",
    ),
    ("Я з Instagram 🙋🏽‍♀️", "Я з Instagram"),
];

const CONTACTS_TEXT: &str = "📞 <b>Контакти Easy.Five</b>\n\n\
                             Менеджер відповість найближчим часом 👇";

const CONTACTS_BUTTON: &str = "✉️ Написати менеджеру";

const ABOUT_TEXT: &str = "Easy.Five — це сервіс професійної допомоги студентам 👩🏽‍💻\n\n\
    🔸 Понад 12 000 виконаних студентських робіт\n\
    🔸 Команда досвідчених авторів і викладачів\n\
    🔸 Працюємо з 90+ спеціальностями\n\
    🔸 Курсові, дипломні, магістерські, реферати та інші роботи\n\
    🔸 Індивідуальне виконання без шаблонів\n\
    🔸 Перевірка на антиплагіат + звіт для клієнта\n\
    🔸 Безкоштовні правки в межах початкових вимог\n\
    🔸 Персональний менеджер на всіх етапах\n\
    🔸 Конфіденційність\n\n\
    Easy.Five — коли навчання стає простішим, а результат — впевненим!";

/// A parsed `/name[@bot] [argument]` message.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub argument: Option<String>,
}

impl Invocation {
    /// Parse a command message.
    ///
    /// `/name@other_bot` is rejected when `bot_username` is known and differs,
    /// so commands addressed to another bot in a group are ignored.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let rest = text.strip_prefix('/')?;

        let (head, tail) = match rest.split_once(char::is_whitespace) {
            Some((head, tail)) => (head, Some(tail)),
            None => (rest, None),
        };

        let name = match head.split_once('@') {
            Some((name, mention)) => {
                if let Some(me) = bot_username {
                    if !mention.eq_ignore_ascii_case(me) {
                        return None;
                    }
                }
                name
            }
            None => head,
        };
        if name.is_empty() {
            return None;
        }

        let argument = tail
            .map(str::trim)
            .filter(|arg| !arg.is_empty())
            .map(str::to_string);

        Some(Self {
            name: name.to_string(),
            argument,
        })
    }

    /// The argument as a lead source tag.
    pub fn source(&self) -> String {
        self.argument
            .clone()
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
    }
}

/// One message to send back to the user.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            parse_mode: None,
            keyboard: None,
        }
    }

    fn html(text: &str) -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            ..Self::plain(text)
        }
    }

    fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// What a handler produced: replies in send order, plus a lead to capture.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub replies: Vec<Reply>,
    /// Source tag of a lead to dispatch once the replies are out
    pub lead_source: Option<String>,
}

pub type CommandHandler = fn(&AppState, &Invocation) -> Outcome;

struct RegisteredCommand {
    name: &'static str,
    description: &'static str,
    handler: CommandHandler,
}

/// Explicit command table, in menu order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<RegisteredCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// The bot's commands: `/start`, `/restart`, `/contacts`, `/about`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("start", "Почати", start);
        registry.register("restart", "Перезапустити бота", restart);
        registry.register("contacts", "Контакти", contacts);
        registry.register("about", "Про Easy.Five", about);
        registry
    }

    /// Register `handler` under `name`, replacing any earlier registration.
    pub fn register(
        &mut self,
        name: &'static str,
        description: &'static str,
        handler: CommandHandler,
    ) {
        self.commands.retain(|cmd| cmd.name != name);
        self.commands.push(RegisteredCommand {
            name,
            description,
            handler,
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.iter().any(|cmd| cmd.name == name)
    }

    /// Run the handler for `invocation`, or `None` if no command matches.
    pub fn route(&self, state: &AppState, invocation: &Invocation) -> Option<Outcome> {
        self.commands
            .iter()
            .find(|cmd| cmd.name == invocation.name)
            .map(|cmd| (cmd.handler)(state, invocation))
    }

    /// Entries for the Telegram command menu.
    pub fn bot_commands(&self) -> Vec<BotCommand> {
        self.commands
            .iter()
            .map(|cmd| BotCommand::new(cmd.name, cmd.description))
            .collect()
    }
}

fn cta(state: &AppState) -> Reply {
    let rows = CTA_BUTTONS
        .iter()
        .map(|(label, prefill)| {
            vec![InlineKeyboardButton::url(
                *label,
                state.links.prefilled(prefill),
            )]
        })
        .collect::<Vec<_>>();
    Reply::plain(CTA_TEXT).with_keyboard(InlineKeyboardMarkup::new(rows))
}

fn start(state: &AppState, invocation: &Invocation) -> Outcome {
    Outcome {
        replies: vec![cta(state)],
        lead_source: Some(invocation.source()),
    }
}

fn restart(state: &AppState, _invocation: &Invocation) -> Outcome {
    Outcome {
        replies: vec![cta(state)],
        lead_source: None,
    }
}

fn contacts(state: &AppState, _invocation: &Invocation) -> Outcome {
    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        CONTACTS_BUTTON,
        state.links.direct(),
    )]]);
    Outcome {
        replies: vec![Reply::html(CONTACTS_TEXT).with_keyboard(keyboard)],
        lead_source: None,
    }
}

fn about(state: &AppState, _invocation: &Invocation) -> Outcome {
    Outcome {
        replies: vec![Reply::plain(ABOUT_TEXT), cta(state)],
        lead_source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::LeadNotifier;
    use crate::links::LinkBuilder;
    use teloxide::types::InlineKeyboardButtonKind;

    fn state() -> AppState {
        AppState {
            links: LinkBuilder::new("t.me", "easy_five05").unwrap(),
            leads: LeadNotifier::disabled(),
        }
    }

    fn run(text: &str) -> Option<Outcome> {
        let invocation = Invocation::parse(text, Some("easy_five_bot"))?;
        CommandRegistry::standard().route(&state(), &invocation)
    }

    fn button_urls(reply: &Reply) -> Vec<String> {
        reply
            .keyboard
            .iter()
            .flat_map(|kb| kb.inline_keyboard.iter().flatten())
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::Url(url) => Some(url.to_string()),
                _ => None,
            })
            .collect()
    }

    fn assert_ends_with_cta(outcome: &Outcome) {
        let prefix = state().links.prefix();
        let last = outcome.replies.last().unwrap();
        assert_eq!(last.text, CTA_TEXT);
        let urls = button_urls(last);
        assert_eq!(urls.len(), 2);
        for url in urls {
            assert!(url.starts_with(&prefix), "{} does not start with {}", url, prefix);
        }
    }

    #[test]
    fn test_parse_plain_command() {
        let inv = Invocation::parse("/restart", None).unwrap();
        assert_eq!(inv.name, "restart");
        assert_eq!(inv.argument, None);
    }

    #[test]
    fn test_parse_argument() {
        let inv = Invocation::parse("/start instagram_ad", None).unwrap();
        assert_eq!(inv.name, "start");
        assert_eq!(inv.argument.as_deref(), Some("instagram_ad"));
        assert_eq!(inv.source(), "instagram_ad");
    }

    #[test]
    fn test_parse_argument_keeps_inner_whitespace() {
        let inv = Invocation::parse("/start   spring promo  ", None).unwrap();
        assert_eq!(inv.argument.as_deref(), Some("spring promo"));
    }

    #[test]
    fn test_parse_blank_argument_is_unknown_source() {
        let inv = Invocation::parse("/start   ", None).unwrap();
        assert_eq!(inv.argument, None);
        assert_eq!(inv.source(), UNKNOWN_SOURCE);
    }

    #[test]
    fn test_parse_mentions() {
        let inv = Invocation::parse("/about@Easy_Five_Bot", Some("easy_five_bot")).unwrap();
        assert_eq!(inv.name, "about");
        assert!(Invocation::parse("/about@other_bot", Some("easy_five_bot")).is_none());
        assert!(Invocation::parse("/about@other_bot", None).is_some());
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert!(Invocation::parse("hello", None).is_none());
        assert!(Invocation::parse("/", None).is_none());
        assert!(Invocation::parse("/ start", None).is_none());
        assert!(Invocation::parse("", None).is_none());
    }

    #[test]
    fn test_start_captures_source() {
        let outcome = run("/start instagram_ad").unwrap();
        assert_eq!(outcome.lead_source.as_deref(), Some("instagram_ad"));
        assert_eq!(outcome.replies.len(), 1);
        assert_ends_with_cta(&outcome);
    }

    #[test]
    fn test_start_without_argument_uses_unknown() {
        let outcome = run("/start").unwrap();
        assert_eq!(outcome.lead_source.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_restart_renders_cta_without_lead() {
        let outcome = run("/restart").unwrap();
        assert!(outcome.lead_source.is_none());
        assert_eq!(outcome.replies.len(), 1);
        assert_ends_with_cta(&outcome);
    }

    #[test]
    fn test_about_sends_info_then_cta() {
        let outcome = run("/about").unwrap();
        assert!(outcome.lead_source.is_none());
        assert_eq!(outcome.replies.len(), 2);
        assert_eq!(outcome.replies[0].text, ABOUT_TEXT);
        assert!(outcome.replies[0].keyboard.is_none());
        assert_ends_with_cta(&outcome);
    }

    #[test]
    fn test_contacts_single_direct_button() {
        let outcome = run("/contacts").unwrap();
        assert!(outcome.lead_source.is_none());
        assert_eq!(outcome.replies.len(), 1);

        let reply = &outcome.replies[0];
        assert!(matches!(reply.parse_mode, Some(ParseMode::Html)));
        assert!(reply.text.contains("<b>Контакти Easy.Five</b>"));
        assert_eq!(button_urls(reply), vec!["https://t.me/easy_five05".to_string()]);
    }

    #[test]
    fn test_cta_buttons_prefill_expected_text() {
        let outcome = run("/restart").unwrap();
        let urls = button_urls(&outcome.replies[0]);
        assert_eq!(
            urls[1],
            format!(
                "https://t.me/easy_five05?text={}",
                urlencoding::encode("Я з Instagram")
            )
        );
    }

    #[test]
    fn test_unknown_command_unhandled() {
        assert!(run("/help").is_none());
        assert!(run("/Start").is_none());
        assert!(!CommandRegistry::standard().contains("help"));
    }

    #[test]
    fn test_register_replaces_existing() {
        fn silent(_: &AppState, _: &Invocation) -> Outcome {
            Outcome::default()
        }

        let mut registry = CommandRegistry::standard();
        registry.register("about", "Про нас", silent);
        let outcome = registry
            .route(&state(), &Invocation::parse("/about", None).unwrap())
            .unwrap();
        assert!(outcome.replies.is_empty());
        assert_eq!(registry.bot_commands().len(), 4);
    }

    #[test]
    fn test_bot_commands_menu_order() {
        let names: Vec<String> = CommandRegistry::standard()
            .bot_commands()
            .into_iter()
            .map(|cmd| cmd.command)
            .collect();
        assert_eq!(names, vec!["start", "restart", "contacts", "about"]);
    }

    #[tokio::test]
    async fn test_start_lead_reaches_webhook() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = url::Url::parse(&server.uri()).unwrap();
        let state = AppState {
            links: LinkBuilder::new("t.me", "easy_five05").unwrap(),
            leads: LeadNotifier::new(Some(endpoint), std::time::Duration::from_secs(8)).unwrap(),
        };

        let invocation = Invocation::parse("/start instagram_ad", None).unwrap();
        let outcome = CommandRegistry::standard()
            .route(&state, &invocation)
            .unwrap();
        let lead = crate::leads::Lead::new(
            42,
            None,
            "Olena",
            outcome.lead_source.unwrap(),
        );
        state.leads.dispatch(lead).unwrap().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["source"], "instagram_ad");
        assert_eq!(body["username"], "");
    }
}
