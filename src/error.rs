/*!

Stable error-kind identifiers and the context stack that accompanies every diagnostic. Parse-level
and structural problems are collected and returned to the caller rather than thrown; usage errors
(misuse of the API itself) are returned as a bare `Result<T, HedError>` at the call that misused it.

`HedError` implements `Display` and `std::error::Error` by hand rather than deriving them.

*/

use std::fmt::{Debug, Display, Formatter};

/// A byte-offset span into a HED string, used to point error messages at the exact input.
pub type Span = (usize, usize);

/// Every stable error-kind identifier named in the error taxonomy. The variant name *is* the
/// stable identifier; do not rename a variant without updating downstream consumers that match
/// on it by name.
#[derive(Clone, Debug, PartialEq)]
pub enum HedError {
  // Parse
  UnmatchedOpen { span: Span },
  UnmatchedClose { span: Span },
  EmptyQuery,
  MalformedQuery { detail: String },

  // Schema resolution
  UnresolvedTag { text: String },
  SchemaMissing,
  InvalidNamespace { namespace: String },

  // Units/values
  InvalidUnit { extension: String },
  InvalidValueClass { extension: String },
  ExtensionNotAllowed { tag: String },

  // Definitions
  DefinitionMissingBody { name: String },
  DefinitionTooManyGroups { name: String },
  DefinitionExtraTag { name: String },
  InvalidDefinitionName { name: String },
  PlaceholderCount { name: String, found: usize },
  PlaceholderNotTakesValue { name: String },
  NestedDefinition { name: String },
  DefinitionBadAttribute { name: String, attribute: String },
  DuplicateDefinition { name: String },
  AmbiguousDefinition { name: String },

  // Def usage
  DefUnmatched { name: String },
  DefValueMissing { name: String },
  DefValueExtra { name: String },
  DefExpandInvalid { name: String },
  PlaceholderArityMismatch { name: String },

  // Temporal
  UnmatchedOffset { name: String },
  OnsetsNotOrdered,
  DurationNegative { value: f64 },
  DurationUnitInvalid { unit: String },

  // Sidecar/column
  MissingColumn { name: String },
  UnknownColumn { name: String },
  SidecarKeyMissing { column: String, key: String, known: Vec<String> },
  CircularColumnRef { column: String },
  UnknownColumnRef { column: String },
  WrongPoundSigns { column: String, expected: usize, found: usize },
  BlankHEDString,
  WrongHEDDataType { column: String, value: String },

  // Usage
  InvalidUsage { detail: String },
  ItemNotFound,
}

impl Display for HedError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      HedError::UnmatchedOpen { span } => {
        write!(f, "unmatched '(' at byte offset {}", span.0)
      }
      HedError::UnmatchedClose { span } => {
        write!(f, "unmatched ')' at byte offset {}", span.0)
      }
      HedError::EmptyQuery => write!(f, "query string is empty"),
      HedError::MalformedQuery { detail } => write!(f, "malformed query: {}", detail),

      HedError::UnresolvedTag { text } => write!(f, "could not resolve tag '{}' against the schema", text),
      HedError::SchemaMissing => write!(f, "operation requires a schema but none was supplied"),
      HedError::InvalidNamespace { namespace } => write!(f, "unrecognized schema namespace '{}'", namespace),

      HedError::InvalidUnit { extension } => write!(f, "'{}' does not match any known unit", extension),
      HedError::InvalidValueClass { extension } => write!(f, "'{}' does not match the tag's value class", extension),
      HedError::ExtensionNotAllowed { tag } => write!(f, "tag '{}' does not allow an extension", tag),

      HedError::DefinitionMissingBody { name } => write!(f, "definition '{}' has no body group", name),
      HedError::DefinitionTooManyGroups { name } => write!(f, "definition '{}' has more than one body group", name),
      HedError::DefinitionExtraTag { name } => write!(f, "definition '{}' has a tag besides Definition/ and its body", name),
      HedError::InvalidDefinitionName { name } => write!(f, "definition name '{}' contains '/' or '#'", name),
      HedError::PlaceholderCount { name, found } => {
        write!(f, "definition '{}' must contain exactly one placeholder, found {}", name, found)
      }
      HedError::PlaceholderNotTakesValue { name } => {
        write!(f, "definition '{}' placeholder tag does not take a value", name)
      }
      HedError::NestedDefinition { name } => write!(f, "definition '{}' body contains a nested Definition/Def/Def-expand", name),
      HedError::DefinitionBadAttribute { name, attribute } => {
        write!(f, "definition '{}' body tag carries disallowed attribute '{}'", name, attribute)
      }
      HedError::DuplicateDefinition { name } => write!(f, "duplicate definition '{}', keeping the first", name),
      HedError::AmbiguousDefinition { name } => write!(f, "could not infer a unique placeholder position for '{}'", name),

      HedError::DefUnmatched { name } => write!(f, "Def/{} does not match any known definition", name),
      HedError::DefValueMissing { name } => write!(f, "Def/{} requires a value but none was supplied", name),
      HedError::DefValueExtra { name } => write!(f, "Def/{} takes no value but one was supplied", name),
      HedError::DefExpandInvalid { name } => write!(f, "Def-expand/{} body does not match the expected expansion", name),
      HedError::PlaceholderArityMismatch { name } => write!(f, "'{}' placeholder arity does not match the supplied value", name),

      HedError::UnmatchedOffset { name } => write!(f, "Offset for '{}' has no matching Onset", name),
      HedError::OnsetsNotOrdered => write!(f, "onset values are not a non-decreasing finite sequence"),
      HedError::DurationNegative { value } => write!(f, "duration {} is negative", value),
      HedError::DurationUnitInvalid { unit } => write!(f, "'{}' is not a recognized time unit", unit),

      HedError::MissingColumn { name } => write!(f, "required column '{}' is missing", name),
      HedError::UnknownColumn { name } => write!(f, "sidecar references unknown column '{}'", name),
      HedError::SidecarKeyMissing { column, key, known } => {
        write!(f, "column '{}' has no entry for '{}' (known: {:?})", column, key, known)
      }
      HedError::CircularColumnRef { column } => write!(f, "column '{}' participates in a circular {{column}} reference", column),
      HedError::UnknownColumnRef { column } => write!(f, "reference to unknown column '{{{}}}'", column),
      HedError::WrongPoundSigns { column, expected, found } => {
        write!(f, "column '{}' expected {} '#' placeholder(s), found {}", column, expected, found)
      }
      HedError::BlankHEDString => write!(f, "row produced an empty HED string"),
      HedError::WrongHEDDataType { column, value } => write!(f, "column '{}' value '{}' has the wrong data type", column, value),

      HedError::InvalidUsage { detail } => write!(f, "invalid usage: {}", detail),
      HedError::ItemNotFound => write!(f, "item not found in container"),
    }
  }
}

impl std::error::Error for HedError {}

/// One frame of the error-context stack: the enclosing operation's name, pushed and popped around
/// each layer (file, sidecar column, sidecar key, HED string, row index).
#[derive(Clone, Debug, PartialEq)]
pub enum ContextFrame {
  File(String),
  SidecarColumn(String),
  SidecarKey(String),
  HedString(String),
  Row(usize),
}

impl Display for ContextFrame {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ContextFrame::File(name) => write!(f, "file '{}'", name),
      ContextFrame::SidecarColumn(name) => write!(f, "sidecar column '{}'", name),
      ContextFrame::SidecarKey(key) => write!(f, "sidecar key '{}'", key),
      ContextFrame::HedString(s) => write!(f, "HED string \"{}\"", s),
      ContextFrame::Row(index) => write!(f, "row {}", index),
    }
  }
}

/// A stack of `ContextFrame`s accumulated by the caller around each enclosing operation. Cheap
/// to clone so a snapshot can be attached to each `Issue` without disturbing the live stack.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorContext(Vec<ContextFrame>);

impl ErrorContext {
  pub fn new() -> Self {
    ErrorContext(Vec::new())
  }

  pub fn push(&mut self, frame: ContextFrame) {
    self.0.push(frame);
  }

  pub fn pop(&mut self) -> Option<ContextFrame> {
    self.0.pop()
  }

  pub fn frames(&self) -> &[ContextFrame] {
    &self.0
  }
}

impl Display for ErrorContext {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for (i, frame) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, " > ")?;
      }
      write!(f, "{}", frame)?;
    }
    Ok(())
  }
}

/// A reported diagnostic: a `HedError` plus the context stack in effect when it was raised and
/// an optional span into the offending HED string.
#[derive(Clone, Debug, PartialEq)]
pub struct Issue {
  pub error: HedError,
  pub context: ErrorContext,
  pub span: Option<Span>,
}

impl Issue {
  pub fn new(error: HedError, context: ErrorContext) -> Self {
    Issue { error, context, span: None }
  }

  pub fn with_span(mut self, span: Span) -> Self {
    self.span = Some(span);
    self
  }
}

impl Display for Issue {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.context.frames().is_empty() {
      write!(f, "{}", self.error)
    } else {
      write!(f, "{}: {}", self.context, self.error)
    }
  }
}
