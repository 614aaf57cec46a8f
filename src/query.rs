/*!

The search engine: an operator-precedence boolean query language over a parsed tag tree. A
query asks whether a HED String contains some combination of tags,
optionally anchored to a particular group ("directly contains" vs. "contains somewhere within"),
and reports every group that witnessed a true answer.

Query-level truth is evaluated once for the whole document (the same reading as "a tag matches
`A and B` iff it matches `A` and matches `B`"): a compound query is true for the document iff its
operands are true for the document, and the groups returned are the union of whichever operand(s)
contributed to that truth. This is why `"[[a]] and [[d]]"` over `"((A, B), (C, D))"` returns both
`(A, B)` and `(C, D)` even though neither group alone satisfies both halves.

*/

use crate::abstractions::NatSet;
use crate::error::{ErrorContext, HedError, Issue};
use crate::group::{Group, NodeId};

#[derive(Clone, Debug, PartialEq)]
enum Token {
  LParen,
  RParen,
  BracketOpen,
  BracketClose,
  DoubleBracketOpen,
  DoubleBracketClose,
  Comma,
  And,
  Or,
  Not,
  Ident(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, HedError> {
  let chars: Vec<char> = text.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;
  while i < chars.len() {
    let c = chars[i];
    match c {
      c if c.is_whitespace() => i += 1,
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        i += 1;
      }
      '~' => {
        tokens.push(Token::Not);
        i += 1;
      }
      '[' => {
        if chars.get(i + 1) == Some(&'[') {
          tokens.push(Token::DoubleBracketOpen);
          i += 2;
        } else {
          tokens.push(Token::BracketOpen);
          i += 1;
        }
      }
      ']' => {
        if chars.get(i + 1) == Some(&']') {
          tokens.push(Token::DoubleBracketClose);
          i += 2;
        } else {
          tokens.push(Token::BracketClose);
          i += 1;
        }
      }
      c if c.is_alphanumeric() || c == '_' || c == '-' || c == '/' => {
        let start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-' || chars[i] == '/') {
          i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        match word.to_lowercase().as_str() {
          "and" => tokens.push(Token::And),
          "or" => tokens.push(Token::Or),
          _ => tokens.push(Token::Ident(word)),
        }
      }
      other => return Err(HedError::MalformedQuery { detail: format!("unexpected character '{}'", other) }),
    }
  }
  Ok(tokens)
}

/// Containment mode for a bracketed or bare primary term.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum Containment {
  /// `[X]` / a bare tag name: X is a descendant anywhere within the candidate group.
  Anywhere,
  /// `[[X]]`: X is a direct child tag of the candidate group, with no interposed group.
  Direct,
}

#[derive(Clone, Debug)]
enum QueryNode {
  Term { names: Vec<String>, containment: Containment },
  Not(Box<QueryNode>),
  And(Box<QueryNode>, Box<QueryNode>),
  Or(Box<QueryNode>, Box<QueryNode>),
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn advance(&mut self) -> Option<Token> {
    let t = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    t
  }

  fn parse_query(&mut self) -> Result<QueryNode, HedError> {
    let node = self.parse_or()?;
    if self.pos != self.tokens.len() {
      return Err(HedError::MalformedQuery { detail: "trailing tokens after a complete query".to_string() });
    }
    Ok(node)
  }

  fn parse_or(&mut self) -> Result<QueryNode, HedError> {
    let mut left = self.parse_and()?;
    while matches!(self.peek(), Some(Token::Or)) {
      self.advance();
      let right = self.parse_and()?;
      left = QueryNode::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_and(&mut self) -> Result<QueryNode, HedError> {
    let mut left = self.parse_unary()?;
    while matches!(self.peek(), Some(Token::And)) {
      self.advance();
      let right = self.parse_unary()?;
      left = QueryNode::And(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_unary(&mut self) -> Result<QueryNode, HedError> {
    if matches!(self.peek(), Some(Token::Not)) {
      self.advance();
      let inner = self.parse_unary()?;
      return Ok(QueryNode::Not(Box::new(inner)));
    }
    self.parse_primary()
  }

  fn parse_primary(&mut self) -> Result<QueryNode, HedError> {
    match self.advance() {
      Some(Token::LParen) => {
        let inner = self.parse_or()?;
        match self.advance() {
          Some(Token::RParen) => Ok(inner),
          _ => Err(HedError::MalformedQuery { detail: "expected a closing ')'".to_string() }),
        }
      }
      Some(Token::DoubleBracketOpen) => {
        let names = self.parse_name_list()?;
        match self.advance() {
          Some(Token::DoubleBracketClose) => Ok(QueryNode::Term { names, containment: Containment::Direct }),
          _ => Err(HedError::MalformedQuery { detail: "expected a closing ']]'".to_string() }),
        }
      }
      Some(Token::BracketOpen) => {
        let names = self.parse_name_list()?;
        match self.advance() {
          Some(Token::BracketClose) => Ok(QueryNode::Term { names, containment: Containment::Anywhere }),
          _ => Err(HedError::MalformedQuery { detail: "expected a closing ']'".to_string() }),
        }
      }
      Some(Token::Ident(name)) => Ok(QueryNode::Term { names: vec![name], containment: Containment::Anywhere }),
      _ => Err(HedError::MalformedQuery { detail: "expected a tag name, '[', '[[', '(', or '~'".to_string() }),
    }
  }

  fn parse_name_list(&mut self) -> Result<Vec<String>, HedError> {
    let mut names = Vec::new();
    loop {
      match self.advance() {
        Some(Token::Ident(name)) => names.push(name),
        _ => return Err(HedError::MalformedQuery { detail: "expected a tag name inside brackets".to_string() }),
      }
      if matches!(self.peek(), Some(Token::Comma)) {
        self.advance();
        continue;
      }
      break;
    }
    Ok(names)
  }
}

/// A compiled query, ready to run against any number of documents.
pub struct Query {
  root: QueryNode,
}

impl Query {
  /// Parses `text` into a compiled query. `EmptyQuery` if `text` is blank; `MalformedQuery` for
  /// unbalanced brackets/parentheses, trailing operators, or other syntax errors.
  pub fn parse(text: &str) -> Result<Query, Issue> {
    if text.trim().is_empty() {
      return Err(Issue::new(HedError::EmptyQuery, ErrorContext::new()));
    }
    let tokens = tokenize(text).map_err(|e| Issue::new(e, ErrorContext::new()))?;
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_query().map_err(|e| Issue::new(e, ErrorContext::new()))?;
    Ok(Query { root })
  }

  /// Evaluates the query against `doc`, returning every group (the document root included) that
  /// witnessed the query's truth. An empty result means the query does not match `doc` at all.
  pub fn evaluate(&self, doc: &Group) -> Vec<NodeId> {
    let all_groups: Vec<NodeId> = std::iter::once(doc.root()).chain(doc.all_groups(doc.root(), None)).collect();
    let result = eval_node(&self.root, doc, &all_groups);
    all_groups.into_iter().filter(|g| result.groups.contains(g.slot())).collect()
  }
}

struct Eval {
  doc_matches: bool,
  groups: NatSet,
}

fn eval_node(node: &QueryNode, doc: &Group, all_groups: &[NodeId]) -> Eval {
  match node {
    QueryNode::Term { names, containment } => {
      let mut groups = NatSet::new();
      for &g in all_groups {
        let satisfies = names.iter().all(|name| match containment {
          Containment::Anywhere => group_has_descendant(doc, g, name),
          Containment::Direct => group_has_direct_child(doc, g, name),
        });
        if satisfies {
          groups.insert(g.slot());
        }
      }
      let doc_matches = !groups.is_empty();
      Eval { doc_matches, groups }
    }
    QueryNode::Not(inner) => {
      let inner_eval = eval_node(inner, doc, all_groups);
      let doc_matches = !inner_eval.doc_matches;
      let mut groups = NatSet::new();
      if doc_matches {
        for &g in all_groups {
          if !inner_eval.groups.contains(g.slot()) {
            groups.insert(g.slot());
          }
        }
      }
      Eval { doc_matches, groups }
    }
    QueryNode::And(left, right) => {
      let l = eval_node(left, doc, all_groups);
      let r = eval_node(right, doc, all_groups);
      let doc_matches = l.doc_matches && r.doc_matches;
      let mut groups = NatSet::new();
      if doc_matches {
        groups.union_with(&l.groups);
        groups.union_with(&r.groups);
      }
      Eval { doc_matches, groups }
    }
    QueryNode::Or(left, right) => {
      let l = eval_node(left, doc, all_groups);
      let r = eval_node(right, doc, all_groups);
      let doc_matches = l.doc_matches || r.doc_matches;
      let mut groups = NatSet::new();
      groups.union_with(&l.groups);
      groups.union_with(&r.groups);
      Eval { doc_matches, groups }
    }
  }
}

fn group_has_descendant(doc: &Group, group: NodeId, name: &str) -> bool {
  doc.all_tags(group).iter().any(|&t| doc.tag(t).map_or(false, |tag| tag.short_base_tag().eq_ignore_ascii_case(name)))
}

fn group_has_direct_child(doc: &Group, group: NodeId, name: &str) -> bool {
  doc.tags(group).iter().any(|&t| doc.tag(t).map_or(false, |tag| tag.short_base_tag().eq_ignore_ascii_case(name)))
}

/// Parses and immediately evaluates `query_text` against `doc`.
pub fn search(doc: &Group, query_text: &str) -> Result<Vec<NodeId>, Issue> {
  let query = Query::parse(query_text)?;
  Ok(query.evaluate(doc))
}
