//! Chat requests.
//!
//! One JSON shape per chat kind, discriminated by `kind`:
//!
//! ```json
//! {"kind": "counsellor", "user_id": "7", "session_id": "s1", "message": "I feel anxious"}
//! {"kind": "bagua", "user_id": "7", "session_id": "s1", "message": "Where should my desk go?", "direction": "north"}
//! {"kind": "tarot", "user_id": "7", "session_id": "s1", "spread": "three_card",
//!  "cards": [{"name": "The Tower", "reversed": true}, ...], "user_context": "Should I move?"}
//! ```
//!
//! `language` defaults to `en` and `private` to `false`.

use crate::{SDKError, SDKResult};
use augury_core::ChatKind;
use serde::{Deserialize, Serialize};

/// Reply language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh")]
    Zh,
    #[serde(rename = "zh_TW")]
    ZhTw,
}

impl Language {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            "zh_TW" => Some(Self::ZhTw),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
            Self::ZhTw => "zh_TW",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tarot card layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TarotSpread {
    /// Past, present, future
    ThreeCard,
    CelticCross,
    /// Five free-form cards
    Custom,
}

impl TarotSpread {
    /// Number of cards the spread is read with
    pub fn card_count(&self) -> usize {
        match self {
            Self::ThreeCard => 3,
            Self::CelticCross => 10,
            Self::Custom => 5,
        }
    }
}

/// One drawn card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarotCard {
    pub name: String,
    #[serde(default)]
    pub reversed: bool,
}

impl TarotCard {
    pub fn upright(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversed: false,
        }
    }

    pub fn reversed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversed: true,
        }
    }

    fn orientation(&self) -> &'static str {
        if self.reversed { "Reversed" } else { "Upright" }
    }
}

/// Kind-specific body of a [`ChatRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatBody {
    Tarot {
        spread: TarotSpread,
        cards: Vec<TarotCard>,
        #[serde(default)]
        user_context: Option<String>,
    },
    Counsellor {
        message: String,
    },
    Bagua {
        message: String,
        #[serde(default)]
        direction: Option<String>,
        #[serde(default)]
        user_context: Option<String>,
    },
}

/// One incoming chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub body: ChatBody,
}

impl ChatRequest {
    pub fn counsellor(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            user_id,
            session_id,
            ChatBody::Counsellor {
                message: message.into(),
            },
        )
    }

    pub fn bagua(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
        direction: Option<String>,
    ) -> Self {
        Self::new(
            user_id,
            session_id,
            ChatBody::Bagua {
                message: message.into(),
                direction,
                user_context: None,
            },
        )
    }

    pub fn tarot(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        spread: TarotSpread,
        cards: Vec<TarotCard>,
        user_context: Option<String>,
    ) -> Self {
        Self::new(
            user_id,
            session_id,
            ChatBody::Tarot {
                spread,
                cards,
                user_context,
            },
        )
    }

    fn new(user_id: impl Into<String>, session_id: impl Into<String>, body: ChatBody) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            language: Language::default(),
            private: false,
            body,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn kind(&self) -> ChatKind {
        match self.body {
            ChatBody::Tarot { .. } => ChatKind::Tarot,
            ChatBody::Counsellor { .. } => ChatKind::Counsellor,
            ChatBody::Bagua { .. } => ChatKind::Bagua,
        }
    }

    /// Reject the turn before any side effect
    pub fn validate(&self) -> SDKResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(SDKError::validation("user_id must not be empty"));
        }
        if self.session_id.trim().is_empty() {
            return Err(SDKError::validation("session_id must not be empty"));
        }

        match &self.body {
            ChatBody::Counsellor { message } | ChatBody::Bagua { message, .. } => {
                if message.trim().is_empty() {
                    return Err(SDKError::validation("message must not be empty"));
                }
            }
            ChatBody::Tarot { spread, cards, .. } => {
                if cards.len() != spread.card_count() {
                    return Err(SDKError::validation(format!(
                        "{:?} spread needs {} cards, got {}",
                        spread,
                        spread.card_count(),
                        cards.len()
                    )));
                }
                if cards.iter().any(|card| card.name.trim().is_empty()) {
                    return Err(SDKError::validation("card name must not be empty"));
                }
            }
        }
        Ok(())
    }

    /// Text that is embedded, scored, and stored as the user side of the turn
    pub fn user_text(&self) -> String {
        match &self.body {
            ChatBody::Counsellor { message } => message.trim().to_string(),
            ChatBody::Bagua {
                message, direction, ..
            } => match direction.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                Some(direction) => format!("{} (direction: {})", message.trim(), direction),
                None => message.trim().to_string(),
            },
            ChatBody::Tarot {
                cards,
                user_context,
                ..
            } => {
                let cards = cards
                    .iter()
                    .map(|card| format!("{} ({})", card.name.trim(), card.orientation()))
                    .collect::<Vec<_>>()
                    .join(", ");
                match user_context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                    Some(context) => format!("{}\nCards: {}", context, cards),
                    None => format!("Cards: {}", cards),
                }
            }
        }
    }

    /// Base system instruction for the request's kind and language
    pub fn system_instruction(&self) -> &'static str {
        system_instruction(self.kind(), self.language)
    }

    /// The framed question that closes the turn prompt
    pub fn question(&self) -> String {
        let text = LocalizedText::of(self.language);
        match &self.body {
            ChatBody::Counsellor { message } => message.trim().to_string(),
            ChatBody::Bagua {
                message,
                direction,
                user_context,
            } => {
                let analyze = match direction.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                    Some(direction) => text.bagua_direction.replace("{direction}", direction),
                    None => text.bagua_general.to_string(),
                };
                format!(
                    "{}\n\"{}\"\n\n{}\n\"{}\"\n\n{}",
                    text.bagua_question,
                    message.trim(),
                    text.bagua_context,
                    user_context.as_deref().unwrap_or("").trim(),
                    analyze
                )
            }
            ChatBody::Tarot {
                spread,
                cards,
                user_context,
            } => {
                let mut out = format!(
                    "{}\n\"{}\"\n\n{}\n\n",
                    text.tarot_question,
                    user_context.as_deref().unwrap_or("").trim(),
                    text.tarot_cards_drawn
                );
                let positions = spread_positions(*spread, self.language);
                for (index, card) in cards.iter().enumerate() {
                    let position = positions
                        .get(index)
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| format!("{} {}", text.tarot_card_label, index + 1));
                    out.push_str(&format!(
                        "{}: {} ({})\n",
                        position,
                        card.name.trim(),
                        card.orientation()
                    ));
                }
                let analyze = match spread {
                    TarotSpread::ThreeCard => text.tarot_analyze_three,
                    TarotSpread::CelticCross => text.tarot_analyze_celtic,
                    TarotSpread::Custom => text.tarot_analyze_custom,
                };
                out.push('\n');
                out.push_str(analyze);
                out
            }
        }
    }
}

/// Base system instruction per kind and language
pub fn system_instruction(kind: ChatKind, language: Language) -> &'static str {
    match (kind, language) {
        (ChatKind::Counsellor, Language::En) => {
            "You are a helpful and empathetic counsellor. Provide thoughtful and supportive advice."
        }
        (ChatKind::Counsellor, Language::Zh) => {
            "你是一个乐于助人且富有同情心的咨询师。请提供周到和支持性的建议。"
        }
        (ChatKind::Counsellor, Language::ZhTw) => {
            "你是一個樂於助人且富有同情心的諮詢師。請提供周到和支持性的建議。"
        }
        (ChatKind::Bagua, Language::En) => {
            "You are a helpful Bagua and Feng Shui expert. Provide clear and insightful advice \
             based on Bagua principles. Address the user's question directly. Answer in English."
        }
        (ChatKind::Bagua, Language::Zh) => {
            "你是一位乐于助人的八卦和风水专家。根据八卦原理提供清晰且有见地的建议。直接回答用户的问题。用中文回答。"
        }
        (ChatKind::Bagua, Language::ZhTw) => {
            "你是一位樂於助人的八卦和風水專家。根據八卦原理提供清晰且有見地的建議。直接回答使用者的問題。用繁體中文回答。"
        }
        (ChatKind::Tarot, Language::En) => {
            "You are a highly insightful and experienced tarot reader. You are skilled at \
             interpreting the cards and connecting them to the user's life. Provide clear, \
             actionable advice, and answer in English. Consider both the light and shadow \
             aspects of each card. If the user provided a specific question or situation, \
             address it directly. If not, provide a general fortune telling based on the cards drawn."
        }
        (ChatKind::Tarot, Language::Zh) => {
            "你是一位非常有洞察力和经验丰富的塔罗牌解读师。你擅长解读塔罗牌并将它们与用户的生活联系起来。\
             提供清晰、可行的建议，并用中文回答。同时考虑每张牌的光明和阴影方面。\
             如果用户提供了具体的问题或情况，请直接回答。如果没有，请根据抽取的卡牌进行一般的运势预测。"
        }
        (ChatKind::Tarot, Language::ZhTw) => {
            "你是一位非常有洞察力和經驗豐富的塔羅牌解讀師。你擅長解讀塔羅牌並將它們與使用者的生活聯繫起來。\
             提供清晰、可行的建議，並用繁體中文回答。同時考慮每張牌的光明和陰影方面。\
             如果使用者提供了具體的問題或情況，請直接回答。如果沒有，請根據抽取的卡牌進行一般的運勢預測。"
        }
    }
}

/// Localized framing for tarot and bagua questions
struct LocalizedText {
    tarot_question: &'static str,
    tarot_cards_drawn: &'static str,
    tarot_card_label: &'static str,
    tarot_analyze_three: &'static str,
    tarot_analyze_celtic: &'static str,
    tarot_analyze_custom: &'static str,
    bagua_question: &'static str,
    bagua_context: &'static str,
    bagua_direction: &'static str,
    bagua_general: &'static str,
}

impl LocalizedText {
    fn of(language: Language) -> Self {
        match language {
            Language::En => Self {
                tarot_question: "The user has asked the following question regarding their fortune:",
                tarot_cards_drawn: "To assist in answering, they have drawn the following tarot cards:",
                tarot_card_label: "Card",
                tarot_analyze_three: "Analyze these cards based on their positions (Past, Present, Future) \
                    and their light or shadow meanings. Connect them to the user's question and provide actionable insights.",
                tarot_analyze_celtic: "Analyze the drawn cards in the context of the Celtic Cross spread positions \
                    and connect them to the user's question. Provide detailed insights based on the light or shadow meanings of the cards.",
                tarot_analyze_custom: "Analyze these five cards, focusing on their individual and collective meanings. \
                    Connect their interpretations to the user's question and provide actionable insights.",
                bagua_question: "The user has asked the following question regarding their Bagua analysis:",
                bagua_context: "User Context:",
                bagua_direction: "Analyze the user's question and provide insights based on Bagua principles, \
                    considering the direction {direction}.",
                bagua_general: "Analyze the user's question and provide a general Bagua analysis and insights.",
            },
            Language::Zh => Self {
                tarot_question: "用户提出了以下与他们的命运相关的问题：",
                tarot_cards_drawn: "为了帮助解答，他们抽出了以下塔罗牌：",
                tarot_card_label: "牌",
                tarot_analyze_three: "根据这些牌的位置（过去、现在、未来）及其光明或阴影含义进行分析。将它们与用户的问题联系起来，并提供可操作的洞察。",
                tarot_analyze_celtic: "根据凯尔特十字牌阵中牌的位置进行分析，并将其与用户的问题联系起来。基于牌的光明或阴影含义提供详细的洞察。",
                tarot_analyze_custom: "分析这五张牌，重点关注它们的个体和整体含义。将它们的解读与用户的问题联系起来，并提供可操作的洞察。",
                bagua_question: "用户提出了以下关于八卦分析的问题：",
                bagua_context: "用户背景：",
                bagua_direction: "根据八卦原理分析用户的问题，并考虑{direction}方位，提供见解。",
                bagua_general: "分析用户的问题，并提供一般的八卦分析和见解。",
            },
            Language::ZhTw => Self {
                tarot_question: "使用者提出了以下與他們的命運相關的問題：",
                tarot_cards_drawn: "為了幫助解答，他們抽出了以下塔羅牌：",
                tarot_card_label: "牌",
                tarot_analyze_three: "根據這些牌的位置（過去、現在、未來）及其光明或陰影含義進行分析。將它們與使用者的問題聯繫起來，並提供可操作的洞察。",
                tarot_analyze_celtic: "根據凱爾特十字牌陣中牌的位置進行分析，並將其與使用者的問題聯繫起來。基於牌的光明或陰影含義提供詳細的洞察。",
                tarot_analyze_custom: "分析這五張牌，重點關注它們的個體和整體含義。將它們的解讀與使用者的問題聯繫起來，並提供可操作的洞察。",
                bagua_question: "使用者提出了以下關於八卦分析的問題：",
                bagua_context: "使用者背景：",
                bagua_direction: "根據八卦原理分析使用者的問題，並考慮{direction}方位，提供見解。",
                bagua_general: "分析使用者的問題，並提供一般的八卦分析和見解。",
            },
        }
    }
}

fn spread_positions(spread: TarotSpread, language: Language) -> &'static [&'static str] {
    match (spread, language) {
        (TarotSpread::ThreeCard, Language::En) => &["Past", "Present", "Future"],
        (TarotSpread::ThreeCard, Language::Zh) => &["过去", "现在", "未来"],
        (TarotSpread::ThreeCard, Language::ZhTw) => &["過去", "現在", "未來"],
        (TarotSpread::CelticCross, Language::En) => &[
            "Present Situation",
            "Challenge",
            "Subconscious",
            "Past Influence",
            "Conscious Goal",
            "Near Future",
            "Self",
            "Environment",
            "Hopes and Fears",
            "Outcome",
        ],
        (TarotSpread::CelticCross, Language::Zh) => &[
            "当前情况", "挑战", "潜意识", "过去的影响", "显意识的目标",
            "不久的将来", "自我", "环境", "希望与恐惧", "结果",
        ],
        (TarotSpread::CelticCross, Language::ZhTw) => &[
            "目前情況", "挑戰", "潛意識", "過去的影響", "顯意識的目標",
            "不久的將來", "自我", "環境", "希望與恐懼", "結果",
        ],
        (TarotSpread::Custom, _) => &[],
    }
}
