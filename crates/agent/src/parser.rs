//! Response grammars: turning raw model output into a thought plus either
//! tool calls or a final answer.
//!
//! ```text
//! <Thought>reasoning</Thought>
//! <Action>
//!   <ToolCalls>
//!     <ToolCall><Name>local_search</Name><Parameters>{"query": "ai"}</Parameters></ToolCall>
//!   </ToolCalls>
//! </Action>
//! ```
//!
//! or `<Thought>..</Thought><Response>final answer</Response>`.
//!
//! Only the seven tag names below are structural. Anything else that looks
//! like markup is kept as literal text.

use ragent_config::GrammarKind;
use ragent_core::error::ParseError;
use ragent_core::tool::ToolCall;
use std::sync::Arc;

const THOUGHT: &str = "Thought";
const ACTION: &str = "Action";
const TOOL_CALLS: &str = "ToolCalls";
const TOOL_CALL: &str = "ToolCall";
const NAME: &str = "Name";
const PARAMETERS: &str = "Parameters";
const RESPONSE: &str = "Response";

const TAGS: [&str; 7] = [THOUGHT, ACTION, TOOL_CALLS, TOOL_CALL, NAME, PARAMETERS, RESPONSE];

/// What the model decided to do after thinking.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Call one or more tools. Never empty.
    Act(Vec<ToolCall>),
    /// Answer the user.
    Respond(String),
}

/// One parsed model completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub thought: String,
    pub step: Step,
}

impl ParsedResponse {
    pub fn action(&self) -> Option<&[ToolCall]> {
        match &self.step {
            Step::Act(calls) => Some(calls),
            Step::Respond(_) => None,
        }
    }

    pub fn final_answer(&self) -> Option<&str> {
        match &self.step {
            Step::Respond(answer) => Some(answer),
            Step::Act(_) => None,
        }
    }
}

/// A strategy for parsing and rendering model output.
pub trait ResponseGrammar: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parse one raw completion.
    fn parse(&self, raw: &str) -> Result<ParsedResponse, ParseError>;

    /// Output-format instructions for the system prompt.
    fn format_instructions(&self) -> &'static str;

    fn render_thought(&self, thought: &str) -> String {
        format!("<{THOUGHT}>{thought}</{THOUGHT}>")
    }

    fn render_action(&self, calls: &[ToolCall]) -> String {
        let mut out = format!("<{ACTION}><{TOOL_CALLS}>");
        for call in calls {
            out.push_str(&format!(
                "<{TOOL_CALL}><{NAME}>{}</{NAME}><{PARAMETERS}>{}</{PARAMETERS}></{TOOL_CALL}>",
                call.name, call.arguments
            ));
        }
        out.push_str(&format!("</{TOOL_CALLS}></{ACTION}>"));
        out
    }

    fn render_response(&self, answer: &str) -> String {
        format!("<{RESPONSE}>{answer}</{RESPONSE}>")
    }

    /// Render a parsed response back into wire text.
    fn render(&self, parsed: &ParsedResponse) -> String {
        let step = match &parsed.step {
            Step::Act(calls) => self.render_action(calls),
            Step::Respond(answer) => self.render_response(answer),
        };
        format!("{}\n{}", self.render_thought(&parsed.thought), step)
    }
}

/// Thought followed by a response. No tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainGrammar;

/// Thought followed by either an action or a response.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolGrammar;

impl ResponseGrammar for PlainGrammar {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn parse(&self, raw: &str) -> Result<ParsedResponse, ParseError> {
        parse(raw, false)
    }

    fn format_instructions(&self) -> &'static str {
        "Reply with exactly one <Thought> block containing your reasoning, followed by \
         exactly one <Response> block containing your answer:\n\
         <Thought>your reasoning</Thought>\n<Response>your answer</Response>"
    }
}

impl ResponseGrammar for ToolGrammar {
    fn name(&self) -> &'static str {
        "tool_augmented"
    }

    fn parse(&self, raw: &str) -> Result<ParsedResponse, ParseError> {
        parse(raw, true)
    }

    fn format_instructions(&self) -> &'static str {
        "Reply with exactly one <Thought> block containing your reasoning, followed by \
         either an <Action> block to call tools or a <Response> block with your final answer.\n\
         To call tools:\n\
         <Thought>your reasoning</Thought>\n\
         <Action><ToolCalls>\
         <ToolCall><Name>tool_name</Name><Parameters>{\"arg\": \"value\"}</Parameters></ToolCall>\
         </ToolCalls></Action>\n\
         Parameters must be a JSON object. Several ToolCall entries may share one action; \
         they run in parallel.\n\
         To answer:\n\
         <Thought>your reasoning</Thought>\n<Response>your final answer</Response>"
    }
}

/// The grammar configured by `kind`.
pub fn grammar_for(kind: GrammarKind) -> Arc<dyn ResponseGrammar> {
    match kind {
        GrammarKind::Plain => Arc::new(PlainGrammar),
        GrammarKind::ToolAugmented => Arc::new(ToolGrammar),
    }
}

// ── Tokenizer ──

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Open(&'static str),
    Close(&'static str),
    Text(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find('<') {
        let at = cursor + offset;
        let after = &input[at + 1..];
        let (closing, name_start) = match after.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, after),
        };

        let tag = TAGS
            .iter()
            .copied()
            .find(|t| name_start.strip_prefix(t).is_some_and(|rest| rest.starts_with('>')));

        match tag {
            Some(tag) => {
                if text_start < at {
                    tokens.push(Token::Text(&input[text_start..at]));
                }
                tokens.push(if closing { Token::Close(tag) } else { Token::Open(tag) });
                cursor = at + 1 + usize::from(closing) + tag.len() + 1;
                text_start = cursor;
            }
            None => cursor = at + 1,
        }
    }

    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }
    tokens
}

fn describe(token: Option<Token<'_>>) -> String {
    match token {
        Some(Token::Open(tag)) => format!("<{tag}>"),
        Some(Token::Close(tag)) => format!("</{tag}>"),
        Some(Token::Text(text)) => format!("text {:?}", truncate_for_error(text.trim())),
        None => "end of output".into(),
    }
}

fn truncate_for_error(text: &str) -> String {
    let short: String = text.chars().take(40).collect();
    if short.len() < text.len() {
        format!("{short}...")
    } else {
        short
    }
}

fn malformed(message: impl Into<String>) -> ParseError {
    ParseError::MalformedStructure(message.into())
}

// ── Parser ──

struct Cursor<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            tokens: tokenize(input),
            pos: 0,
        }
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Skip whitespace-only text. Any other text is misplaced.
    fn skip_blank(&mut self) -> Result<(), ParseError> {
        while let Some(Token::Text(text)) = self.tokens.get(self.pos).copied() {
            if !text.trim().is_empty() {
                return Err(malformed(format!(
                    "unexpected {} outside of a block",
                    describe(Some(Token::Text(text)))
                )));
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), ParseError> {
        self.skip_blank()?;
        match self.next() {
            Some(Token::Open(found)) if found == tag => Ok(()),
            other => Err(malformed(format!("expected <{tag}>, found {}", describe(other)))),
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), ParseError> {
        self.skip_blank()?;
        match self.next() {
            Some(Token::Close(found)) if found == tag => Ok(()),
            other => Err(malformed(format!("expected </{tag}>, found {}", describe(other)))),
        }
    }

    /// Collect literal text up to `</tag>`. Structural tags inside are
    /// reported through `nested`.
    fn text_block(
        &mut self,
        tag: &'static str,
        nested: impl Fn(Token<'_>) -> ParseError,
    ) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.next() {
                Some(Token::Text(t)) => text.push_str(t),
                Some(Token::Close(found)) if found == tag => return Ok(text.trim().to_string()),
                Some(token) => return Err(nested(token)),
                None => return Err(malformed(format!("unclosed <{tag}>"))),
            }
        }
    }

    fn expect_end(&mut self, after: &str) -> Result<(), ParseError> {
        self.skip_blank()?;
        match self.next() {
            None => Ok(()),
            other => Err(malformed(format!("unexpected {} after {after}", describe(other)))),
        }
    }
}

fn nested_in(block: &'static str) -> impl Fn(Token<'_>) -> ParseError {
    move |token| malformed(format!("unexpected {} inside <{block}>", describe(Some(token))))
}

fn parse(raw: &str, allow_action: bool) -> Result<ParsedResponse, ParseError> {
    let mut cursor = Cursor::new(raw);

    cursor.expect_open(THOUGHT)?;
    let thought = cursor.text_block(THOUGHT, |token| match token {
        Token::Open(THOUGHT) => malformed("nested <Thought>"),
        Token::Open(tag) => ParseError::MixedTags {
            tag: tag.to_string(),
        },
        Token::Close(other) => malformed(format!("expected </Thought>, found </{other}>")),
        Token::Text(_) => malformed("unexpected text"),
    })?;

    cursor.skip_blank()?;
    match cursor.next() {
        Some(Token::Open(RESPONSE)) => {
            let answer = cursor.text_block(RESPONSE, nested_in(RESPONSE))?;
            cursor.expect_end("</Response>")?;
            Ok(ParsedResponse {
                thought,
                step: Step::Respond(answer),
            })
        }
        Some(Token::Open(ACTION)) if allow_action => {
            let calls = parse_action(&mut cursor)?;
            cursor.expect_end("</Action>")?;
            Ok(ParsedResponse {
                thought,
                step: Step::Act(calls),
            })
        }
        Some(Token::Open(ACTION)) => Err(malformed(
            "<Action> blocks are not allowed here; answer with a <Response> block",
        )),
        Some(Token::Open(THOUGHT)) => Err(malformed("duplicate <Thought> block")),
        other => Err(malformed(format!(
            "expected {} after </Thought>, found {}",
            if allow_action { "<Action> or <Response>" } else { "<Response>" },
            describe(other)
        ))),
    }
}

/// Parse the inside of an `<Action>` block, consuming its close tag.
///
/// The whole structure is checked before any parameters are decoded, so a
/// structural error always wins over a bad argument.
fn parse_action(cursor: &mut Cursor<'_>) -> Result<Vec<ToolCall>, ParseError> {
    cursor.expect_open(TOOL_CALLS)?;

    let mut raw_calls: Vec<(String, String)> = Vec::new();
    loop {
        cursor.skip_blank()?;
        match cursor.next() {
            Some(Token::Open(TOOL_CALL)) => {
                cursor.expect_open(NAME)?;
                let name = cursor.text_block(NAME, nested_in(NAME))?;
                if name.is_empty() {
                    return Err(malformed(format!(
                        "tool call #{} has an empty <Name>",
                        raw_calls.len() + 1
                    )));
                }
                cursor.expect_open(PARAMETERS)?;
                let params = cursor.text_block(PARAMETERS, nested_in(PARAMETERS))?;
                cursor.expect_close(TOOL_CALL)?;
                raw_calls.push((name, params));
            }
            Some(Token::Close(TOOL_CALLS)) => break,
            other => {
                return Err(malformed(format!(
                    "expected <ToolCall> or </ToolCalls>, found {}",
                    describe(other)
                )));
            }
        }
    }
    cursor.expect_close(ACTION)?;

    if raw_calls.is_empty() {
        return Err(malformed("<ToolCalls> must contain at least one <ToolCall>"));
    }

    raw_calls
        .into_iter()
        .enumerate()
        .map(|(i, (name, params))| {
            let index = i + 1;
            let arguments = decode_parameters(&params).map_err(|reason| {
                ParseError::InvalidToolArguments {
                    index,
                    name: name.clone(),
                    reason,
                }
            })?;
            Ok(ToolCall {
                id: format!("call_{index}"),
                name,
                arguments,
            })
        })
        .collect()
}

fn decode_parameters(params: &str) -> Result<serde_json::Value, String> {
    if params.is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<serde_json::Value>(params) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err("parameters must be a JSON object".into()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}
