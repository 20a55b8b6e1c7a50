use serde_json::Value;

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Hello { room_id: Option<String> },
    TextComplete { step_id: String },
    AnswerDraft { text: String },
    SubmitAnswer,
    SelectChoice { key: String },
    Retry,
    UseHint,
    CompleteGame,
    Reset,
    Pause,
    Resume,
    Leave,
    Ping { t: f64 },
}

const MAX_DRAFT_LEN: usize = 200;

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let room_id = match object.get("roomId") {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::Hello { room_id })
        }
        "text_complete" => {
            let step_id = object.get("stepId")?.as_str()?.to_string();
            Some(ParsedClientMessage::TextComplete { step_id })
        }
        "answer_draft" => {
            let text = object.get("text")?.as_str()?;
            if text.chars().count() > MAX_DRAFT_LEN {
                return None;
            }
            Some(ParsedClientMessage::AnswerDraft {
                text: text.to_string(),
            })
        }
        "submit_answer" => Some(ParsedClientMessage::SubmitAnswer),
        "select_choice" => {
            let key = match object.get("key")? {
                Value::String(key) => key.clone(),
                Value::Number(number) => number.as_i64()?.to_string(),
                _ => return None,
            };
            Some(ParsedClientMessage::SelectChoice { key })
        }
        "retry" => Some(ParsedClientMessage::Retry),
        "use_hint" => Some(ParsedClientMessage::UseHint),
        "complete_game" => Some(ParsedClientMessage::CompleteGame),
        "reset" => Some(ParsedClientMessage::Reset),
        "pause" => Some(ParsedClientMessage::Pause),
        "resume" => Some(ParsedClientMessage::Resume),
        "leave" => Some(ParsedClientMessage::Leave),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}
