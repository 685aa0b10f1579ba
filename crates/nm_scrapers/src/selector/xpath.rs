//! A small XPath 1.0 subset evaluated directly over a `scraper` document.
//!
//! Supported: absolute and relative location paths, `//`, `.` and `..`, the
//! child, descendant(-or-self), self, parent, ancestor(-or-self) and sibling
//! axes, `*` / `node()` / name tests, and a terminal `@attr` or `text()` step.
//! Predicates may be positions, `last()`, attribute or text existence,
//! `=` / `!=` against a string literal, `contains()`, `starts-with()`,
//! `not()`, and `and` / `or` combinations.

use std::collections::HashSet;
use nm_core::{text, Error, Result};
use scraper::{ElementRef, Html};
use super::Match;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfNode,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfNode,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    /// `node()`: anything, including the document root
    Node,
    /// `*`: any element
    Element,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Attr(String),
    Text,
}

#[derive(Debug, Clone, PartialEq)]
enum Cond {
    Exists(Operand),
    Equals(Operand, String),
    NotEquals(Operand, String),
    Contains(Operand, String),
    StartsWith(Operand, String),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    Test(Cond),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Nodes {
        axis: Axis,
        test: NodeTest,
        predicates: Vec<Predicate>,
    },
    Attribute(String),
    Text,
}

#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

fn invalid(source: &str, reason: &str) -> Error {
    Error::Config(format!("Invalid XPath '{}': {}", source, reason))
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        && !s.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
}

/// Scans `s` and returns byte offsets of `target` outside quotes and brackets.
fn top_level_positions(s: &str, target: u8) -> Vec<usize> {
    let bytes = s.as_bytes();
    let mut positions = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth -= 1,
            _ if depth == 0 && b == target => positions.push(i),
            _ => {}
        }
    }
    positions
}

/// Splits on a keyword (`and`, `or`) surrounded by whitespace at the top level.
fn split_keyword<'s>(s: &'s str, keyword: &str) -> Vec<&'s str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth -= 1,
            _ if depth == 0 && b.is_ascii_whitespace() => {
                let rest = &s[i + 1..];
                let after = rest.as_bytes().get(keyword.len());
                if rest.starts_with(keyword) && after.map_or(false, |c| c.is_ascii_whitespace()) {
                    parts.push(&s[start..i]);
                    i += keyword.len() + 1;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// `(expr)` -> `expr` when the outer parentheses enclose everything.
fn strip_outer_parens(s: &str) -> &str {
    let s = s.trim();
    if !(s.starts_with('(') && s.ends_with(')')) {
        return s;
    }
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return s;
                }
            }
            _ => {}
        }
    }
    strip_outer_parens(&s[1..s.len() - 1])
}

fn call_args<'s>(expr: &'s str, function: &str) -> Option<&'s str> {
    let rest = expr.strip_prefix(function)?.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner)
}

fn parse_literal(s: &str, source: &str) -> Result<String> {
    let s = s.trim();
    let quoted = s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')));
    if quoted {
        Ok(s[1..s.len() - 1].to_string())
    } else {
        Err(invalid(source, &format!("expected a string literal, found '{}'", s)))
    }
}

fn parse_operand(s: &str, source: &str) -> Result<Operand> {
    let s = s.trim();
    if let Some(name) = s.strip_prefix('@') {
        if is_name(name) {
            return Ok(Operand::Attr(name.to_ascii_lowercase()));
        }
    }
    match s {
        "text()" | "." | "string()" | "normalize-space()" | "normalize-space(.)" => Ok(Operand::Text),
        _ => Err(invalid(source, &format!("unsupported operand '{}'", s))),
    }
}

fn parse_binary_call(expr: &str, function: &str, source: &str) -> Result<Option<(Operand, String)>> {
    let Some(args) = call_args(expr, function) else {
        return Ok(None);
    };
    let commas = top_level_positions(args, b',');
    if commas.len() != 1 {
        return Err(invalid(source, &format!("{}() takes two arguments", function)));
    }
    let (lhs, rhs) = args.split_at(commas[0]);
    Ok(Some((parse_operand(lhs, source)?, parse_literal(&rhs[1..], source)?)))
}

fn parse_cond(expr: &str, source: &str) -> Result<Cond> {
    let expr = strip_outer_parens(expr);
    if expr.is_empty() {
        return Err(invalid(source, "empty predicate"));
    }

    let parts = split_keyword(expr, "or");
    if parts.len() > 1 {
        return fold(parts, source, Cond::Or);
    }
    let parts = split_keyword(expr, "and");
    if parts.len() > 1 {
        return fold(parts, source, Cond::And);
    }

    if let Some(inner) = call_args(expr, "not") {
        return Ok(Cond::Not(Box::new(parse_cond(inner, source)?)));
    }
    if let Some((operand, literal)) = parse_binary_call(expr, "contains", source)? {
        return Ok(Cond::Contains(operand, literal));
    }
    if let Some((operand, literal)) = parse_binary_call(expr, "starts-with", source)? {
        return Ok(Cond::StartsWith(operand, literal));
    }

    let equals = top_level_positions(expr, b'=');
    if let Some(&pos) = equals.first() {
        let negated = pos > 0 && expr.as_bytes()[pos - 1] == b'!';
        let lhs = if negated { &expr[..pos - 1] } else { &expr[..pos] };
        let operand = parse_operand(lhs, source)?;
        let literal = parse_literal(&expr[pos + 1..], source)?;
        return Ok(if negated {
            Cond::NotEquals(operand, literal)
        } else {
            Cond::Equals(operand, literal)
        });
    }

    Ok(Cond::Exists(parse_operand(expr, source)?))
}

fn fold(parts: Vec<&str>, source: &str, combine: fn(Box<Cond>, Box<Cond>) -> Cond) -> Result<Cond> {
    let mut conds = parts.into_iter().map(|p| parse_cond(p, source));
    let first = conds.next().ok_or_else(|| invalid(source, "empty predicate"))??;
    conds.try_fold(first, |acc, next: Result<Cond>| -> Result<Cond> {
        Ok(combine(Box::new(acc), Box::new(next?)))
    })
}

fn parse_predicates(mut s: &str, source: &str) -> Result<Vec<Predicate>> {
    let mut predicates = Vec::new();
    while !s.is_empty() {
        if !s.starts_with('[') {
            return Err(invalid(source, &format!("unexpected '{}'", s)));
        }
        // Position of the bracket closing the one at index 0.
        let mut depth = 0;
        let mut quote: Option<char> = None;
        let mut close = None;
        for (i, c) in s.char_indices() {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| invalid(source, "unclosed '['"))?;
        let inner = s[1..close].trim();

        let predicate = if let Ok(position) = inner.parse::<usize>() {
            if position == 0 {
                return Err(invalid(source, "positions start at 1"));
            }
            Predicate::Position(position)
        } else if inner == "last()" {
            Predicate::Last
        } else {
            Predicate::Test(parse_cond(inner, source)?)
        };
        predicates.push(predicate);
        s = s[close + 1..].trim_start();
    }
    Ok(predicates)
}

fn parse_step(segment: &str, source: &str) -> Result<Step> {
    match segment {
        "." => {
            return Ok(Step::Nodes {
                axis: Axis::SelfNode,
                test: NodeTest::Node,
                predicates: Vec::new(),
            })
        }
        ".." => {
            return Ok(Step::Nodes {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            })
        }
        "text()" => return Ok(Step::Text),
        _ => {}
    }

    let attribute = segment
        .strip_prefix('@')
        .or_else(|| segment.strip_prefix("attribute::"));
    if let Some(name) = attribute {
        return if is_name(name) {
            Ok(Step::Attribute(name.to_ascii_lowercase()))
        } else {
            Err(invalid(source, &format!("bad attribute name '{}'", name)))
        };
    }

    let (axis, rest) = match segment.find("::") {
        Some(i) => {
            let name = segment[..i].trim();
            let axis = Axis::from_name(name)
                .ok_or_else(|| invalid(source, &format!("unsupported axis '{}'", name)))?;
            (axis, segment[i + 2..].trim_start())
        }
        None => (Axis::Child, segment),
    };

    let bracket = rest.find('[').unwrap_or(rest.len());
    let test = match rest[..bracket].trim() {
        "*" => NodeTest::Element,
        "node()" => NodeTest::Node,
        name if is_name(name) => NodeTest::Name(name.to_ascii_lowercase()),
        other => return Err(invalid(source, &format!("bad node test '{}'", other))),
    };
    let predicates = parse_predicates(&rest[bracket..], source)?;

    Ok(Step::Nodes { axis, test, predicates })
}

/// Byte offset of the next `/` that separates steps.
fn step_end(s: &str) -> usize {
    top_level_positions(s, b'/').first().copied().unwrap_or(s.len())
}

impl XPath {
    pub fn parse(source: &str) -> Result<Self> {
        let expr = source.trim();
        if expr.is_empty() {
            return Err(invalid(source, "empty expression"));
        }

        let absolute = expr.starts_with('/');
        let mut steps = Vec::new();
        let mut rest = expr;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix("//") {
                steps.push(Step::Nodes {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix('/') {
                rest = tail;
            }

            let end = step_end(rest);
            let segment = rest[..end].trim();
            if segment.is_empty() {
                return Err(invalid(source, "empty step"));
            }
            steps.push(parse_step(segment, source)?);
            rest = &rest[end..];
        }

        let terminal = steps
            .iter()
            .position(|step| matches!(step, Step::Attribute(_) | Step::Text));
        if let Some(i) = terminal {
            if i != steps.len() - 1 {
                return Err(invalid(source, "@attribute and text() must be the last step"));
            }
        }

        Ok(Self {
            source: source.to_string(),
            absolute,
            steps,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn select_document<'a>(&self, document: &'a Html) -> Vec<Match<'a>> {
        self.evaluate(Node::Root(document.root_element()))
    }

    pub fn select_from<'a>(&self, element: ElementRef<'a>) -> Vec<Match<'a>> {
        self.evaluate(Node::Element(element))
    }

    fn evaluate<'a>(&self, scope: Node<'a>) -> Vec<Match<'a>> {
        let start = if self.absolute { Node::Root(scope.top()) } else { scope };
        let mut current = vec![start];

        for step in &self.steps {
            match step {
                Step::Nodes { axis, test, predicates } => {
                    let mut next = Vec::new();
                    for node in &current {
                        let mut candidates: Vec<Node<'a>> = node
                            .axis(*axis)
                            .into_iter()
                            .filter(|candidate| candidate.passes(test))
                            .collect();
                        for predicate in predicates {
                            candidates = apply_predicate(candidates, predicate);
                        }
                        next.extend(candidates);
                    }
                    let mut seen = HashSet::new();
                    next.retain(|node| {
                        seen.insert(match node {
                            Node::Root(_) => None,
                            Node::Element(el) => Some(el.id()),
                        })
                    });
                    current = next;
                }
                Step::Attribute(name) => {
                    return current
                        .iter()
                        .filter_map(Node::element)
                        .filter_map(|el| {
                            el.value().attr(name).map(|value| Match::Value {
                                value: value.to_string(),
                                owner: el,
                            })
                        })
                        .collect();
                }
                Step::Text => {
                    return current
                        .iter()
                        .filter_map(Node::element)
                        .flat_map(|el| {
                            el.children()
                                .filter_map(|child| child.value().as_text().map(|t| text::collapse_whitespace(t)))
                                .filter(|t| !t.is_empty())
                                .map(move |value| Match::Value { value, owner: el })
                        })
                        .collect();
                }
            }
        }

        current.iter().filter_map(Node::element).map(Match::Element).collect()
    }
}

/// A node in the evaluation context. `Root` stands for the document node and
/// carries the top-level element.
#[derive(Debug, Clone, Copy)]
enum Node<'a> {
    Root(ElementRef<'a>),
    Element(ElementRef<'a>),
}

impl<'a> Node<'a> {
    fn element(&self) -> Option<ElementRef<'a>> {
        match self {
            Node::Root(_) => None,
            Node::Element(el) => Some(*el),
        }
    }

    fn top(&self) -> ElementRef<'a> {
        match self {
            Node::Root(top) => *top,
            Node::Element(el) => top_element(*el),
        }
    }

    fn passes(&self, test: &NodeTest) -> bool {
        match (test, self) {
            (NodeTest::Node, _) => true,
            (_, Node::Root(_)) => false,
            (NodeTest::Element, Node::Element(_)) => true,
            (NodeTest::Name(name), Node::Element(el)) => el.value().name().eq_ignore_ascii_case(name),
        }
    }

    fn axis(self, axis: Axis) -> Vec<Node<'a>> {
        match (axis, self) {
            (Axis::SelfNode, node) => vec![node],
            (Axis::Child, Node::Root(top)) => vec![Node::Element(top)],
            (Axis::Child, Node::Element(el)) => el.children().filter_map(ElementRef::wrap).map(Node::Element).collect(),
            (Axis::Descendant, Node::Root(top)) => {
                top.descendants().filter_map(ElementRef::wrap).map(Node::Element).collect()
            }
            (Axis::Descendant, Node::Element(el)) => el
                .descendants()
                .skip(1)
                .filter_map(ElementRef::wrap)
                .map(Node::Element)
                .collect(),
            (Axis::DescendantOrSelf, node) => {
                let mut nodes = vec![node];
                nodes.extend(node.axis(Axis::Descendant));
                nodes
            }
            (Axis::Parent, Node::Root(_)) | (Axis::Ancestor, Node::Root(_)) => Vec::new(),
            (Axis::Parent, Node::Element(el)) => match el.parent().and_then(ElementRef::wrap) {
                Some(parent) => vec![Node::Element(parent)],
                None => vec![Node::Root(el)],
            },
            (Axis::Ancestor, Node::Element(el)) => {
                let mut nodes: Vec<Node<'a>> = el.ancestors().filter_map(ElementRef::wrap).map(Node::Element).collect();
                nodes.push(Node::Root(top_element(el)));
                nodes
            }
            (Axis::AncestorOrSelf, node) => {
                let mut nodes = vec![node];
                nodes.extend(node.axis(Axis::Ancestor));
                nodes
            }
            (Axis::FollowingSibling, Node::Element(el)) => {
                el.next_siblings().filter_map(ElementRef::wrap).map(Node::Element).collect()
            }
            (Axis::PrecedingSibling, Node::Element(el)) => {
                el.prev_siblings().filter_map(ElementRef::wrap).map(Node::Element).collect()
            }
            (Axis::FollowingSibling, Node::Root(_)) | (Axis::PrecedingSibling, Node::Root(_)) => Vec::new(),
        }
    }
}

fn top_element(el: ElementRef<'_>) -> ElementRef<'_> {
    el.ancestors().filter_map(ElementRef::wrap).last().unwrap_or(el)
}

fn apply_predicate<'a>(nodes: Vec<Node<'a>>, predicate: &Predicate) -> Vec<Node<'a>> {
    match predicate {
        Predicate::Position(n) => nodes.into_iter().nth(n - 1).into_iter().collect(),
        Predicate::Last => nodes.last().copied().into_iter().collect(),
        Predicate::Test(cond) => nodes
            .into_iter()
            .filter(|node| node.element().map_or(false, |el| eval_cond(cond, el)))
            .collect(),
    }
}

fn operand_value(operand: &Operand, el: ElementRef<'_>) -> Option<String> {
    match operand {
        Operand::Attr(name) => el.value().attr(name).map(str::to_string),
        Operand::Text => Some(text::collapse_whitespace(&el.text().collect::<String>())),
    }
}

fn equals_literal(operand: &Operand, value: &str, literal: &str) -> bool {
    match operand {
        Operand::Text => value == literal.trim(),
        Operand::Attr(_) => value == literal,
    }
}

/// Comparisons against a missing attribute are false for both `=` and `!=`.
fn eval_cond(cond: &Cond, el: ElementRef<'_>) -> bool {
    match cond {
        Cond::Exists(operand) => operand_value(operand, el).map_or(false, |v| {
            matches!(operand, Operand::Attr(_)) || !v.is_empty()
        }),
        Cond::Equals(operand, literal) => {
            operand_value(operand, el).map_or(false, |v| equals_literal(operand, &v, literal))
        }
        Cond::NotEquals(operand, literal) => {
            operand_value(operand, el).map_or(false, |v| !equals_literal(operand, &v, literal))
        }
        Cond::Contains(operand, literal) => operand_value(operand, el).map_or(false, |v| v.contains(literal.as_str())),
        Cond::StartsWith(operand, literal) => {
            operand_value(operand, el).map_or(false, |v| v.starts_with(literal.as_str()))
        }
        Cond::And(a, b) => eval_cond(a, el) && eval_cond(b, el),
        Cond::Or(a, b) => eval_cond(a, el) || eval_cond(b, el),
        Cond::Not(inner) => !eval_cond(inner, el),
    }
}
