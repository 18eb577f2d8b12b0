use super::expr::{self, Expr, Statement, UnaryOperator};
use crate::{
    directive::{split_top_level, strip_parens},
    log::{error_eof, Error, UNEXPECTED_TOKEN},
    region::Region,
};

/// How a section end hands its captured text to the block stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionMode {
    /// Store the capture, appending when the block already has a value.
    Stop,
    /// Same as Stop, but also write the block value to the output.
    Show,
    /// Store the capture, replacing any existing value.
    Overwrite,
}

/// The variables a `foreach` binds on each pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub key: Option<String>,
    pub value: String,
}

/// One executable node of a loaded artifact.
#[derive(Debug, PartialEq)]
pub enum Node<'artifact> {
    Text(&'artifact str),
    Literal(String),
    Out(Expr),
    Raw(Expr),
    If {
        arms: Vec<(Expr, Vec<Node<'artifact>>)>,
        fallback: Option<Vec<Node<'artifact>>>,
    },
    Switch {
        subject: Expr,
        cases: Vec<(Option<Expr>, Vec<Node<'artifact>>)>,
    },
    Break(usize),
    BreakIf(Expr),
    Continue(usize),
    ContinueIf(Expr),
    Exit,
    ExitIf(Expr),
    For {
        init: Option<Statement>,
        condition: Option<Expr>,
        step: Option<Statement>,
        body: Vec<Node<'artifact>>,
    },
    Foreach {
        subject: Expr,
        binding: Binding,
        body: Vec<Node<'artifact>>,
        empty: Option<Vec<Node<'artifact>>>,
    },
    While {
        condition: Expr,
        body: Vec<Node<'artifact>>,
    },
    SectionBegin(Expr),
    SectionEnd(SectionMode),
    Yield {
        name: Expr,
        default: Option<Expr>,
    },
    Extends(Expr),
    Include(Expr),
    Json(Expr),
    Set {
        target: String,
        expr: Expr,
    },
    Unset(Vec<String>),
    Do(Statement),
    Method(Expr),
}

/// A loaded artifact, ready to execute.
#[derive(Debug)]
pub struct Program<'artifact> {
    pub nodes: Vec<Node<'artifact>>,
}

impl<'artifact> Program<'artifact> {
    /// Load the artifact text into an executable [`Program`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an instruction is unrecognized, carries
    /// an invalid expression, or the artifact ends inside an open
    /// construct.
    pub fn parse(artifact: &'artifact str) -> Result<Self, Error> {
        let mut parser = Parser {
            artifact,
            pieces: segment(artifact),
            cursor: 0,
        };
        let (nodes, closer) = parser.parse_until(&[])?;
        if let Some(closer) = closer {
            return Err(unexpected(artifact, &closer));
        }

        Ok(Self { nodes })
    }
}

enum Piece<'artifact> {
    Text(&'artifact str),
    Tag {
        op: &'artifact str,
        args: &'artifact str,
        region: Region,
    },
}

const TAG_BEGIN: &str = "<?v ";
const TAG_END: &str = "?>";
const VERBATIM_END: &str = "<?v endverbatim ?>";

/// Closing ops that are only meaningful to an enclosing construct.
const CLOSERS: [&str; 11] = [
    "elseif",
    "else",
    "endif",
    "case",
    "default",
    "endswitch",
    "endfor",
    "endforeach",
    "empty",
    "endforelse",
    "endwhile",
];

/// Split artifact text into text and instruction pieces.
///
/// One newline directly after a closing `?>` belongs to the instruction
/// and is swallowed. A verbatim instruction captures everything up to
/// the matching end as plain text.
fn segment(artifact: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut cursor = 0;

    while let Some(relative) = artifact[cursor..].find(TAG_BEGIN) {
        let begin = cursor + relative;
        let inner = begin + TAG_BEGIN.len();
        let Some(length) = artifact[inner..].find(TAG_END) else {
            break;
        };
        let end = inner + length + TAG_END.len();

        if begin > cursor {
            pieces.push(Piece::Text(&artifact[cursor..begin]));
        }
        let body = artifact[inner..inner + length].trim();
        let (op, args) = match body.find(char::is_whitespace) {
            Some(at) => (&body[..at], body[at..].trim_start()),
            None => (body, ""),
        };
        cursor = swallow_newline(artifact, end);

        if op == "verbatim" {
            let (text, after) = match artifact[cursor..].find(VERBATIM_END) {
                Some(length) => {
                    let close = cursor + length;
                    (
                        &artifact[cursor..close],
                        swallow_newline(artifact, close + VERBATIM_END.len()),
                    )
                }
                None => (&artifact[cursor..], artifact.len()),
            };
            pieces.push(Piece::Text(text));
            cursor = after;
            continue;
        }

        pieces.push(Piece::Tag {
            op,
            args,
            region: Region::new(begin..end),
        });
    }
    if cursor < artifact.len() {
        pieces.push(Piece::Text(&artifact[cursor..]));
    }

    pieces
}

fn swallow_newline(artifact: &str, from: usize) -> usize {
    let rest = &artifact[from..];
    if rest.starts_with("\r\n") {
        from + 2
    } else if rest.starts_with('\n') {
        from + 1
    } else {
        from
    }
}

struct Closer<'artifact> {
    op: &'artifact str,
    args: &'artifact str,
    region: Region,
}

fn unexpected(artifact: &str, closer: &Closer) -> Error {
    Error::build(UNEXPECTED_TOKEN)
        .with_pointer(artifact, closer.region)
        .with_help(format!("`{}` has no matching opening instruction", closer.op))
}

struct Parser<'artifact> {
    artifact: &'artifact str,
    pieces: Vec<Piece<'artifact>>,
    cursor: usize,
}

impl<'artifact> Parser<'artifact> {
    /// Parse nodes until one of the stop ops appears, returning the
    /// nodes and the stop instruction that ended them.
    fn parse_until(
        &mut self,
        stop: &[&str],
    ) -> Result<(Vec<Node<'artifact>>, Option<Closer<'artifact>>), Error> {
        let mut nodes = Vec::new();

        while self.cursor < self.pieces.len() {
            let piece = &self.pieces[self.cursor];
            self.cursor += 1;
            let (op, args, region) = match piece {
                Piece::Text(text) => {
                    nodes.push(Node::Text(*text));
                    continue;
                }
                Piece::Tag { op, args, region } => (*op, *args, *region),
            };

            if stop.contains(&op) {
                return Ok((nodes, Some(Closer { op, args, region })));
            }
            if CLOSERS.contains(&op) {
                return Err(unexpected(self.artifact, &Closer { op, args, region }));
            }
            if let Some(node) = self.parse_node(op, args, region)? {
                nodes.push(node);
            }
        }

        Ok((nodes, None))
    }

    fn parse_node(
        &mut self,
        op: &'artifact str,
        args: &'artifact str,
        region: Region,
    ) -> Result<Option<Node<'artifact>>, Error> {
        let node = match op {
            "note" => return Ok(None),
            "lit" => Node::Literal(format!("@{args}")),
            "out" => Node::Out(self.expression(args, region)?),
            "raw" => Node::Raw(self.expression(args, region)?),
            "if" => self.parse_if(self.expression(args, region)?)?,
            "unless" => {
                let condition = self.expression(args, region)?;
                self.parse_if(Expr::Unary(UnaryOperator::Not, Box::new(condition)))?
            }
            "isset" => {
                let arguments = split_top_level(strip_parens(args), ',')
                    .into_iter()
                    .map(|argument| self.expression(argument, region))
                    .collect::<Result<Vec<_>, _>>()?;
                self.parse_if(Expr::Call("isset".to_string(), arguments))?
            }
            "switch" => self.parse_switch(args, region)?,
            "break" => Node::Break(self.levels(args)),
            "continue" => Node::Continue(self.levels(args)),
            "breakif" => Node::BreakIf(self.expression(args, region)?),
            "continueif" => Node::ContinueIf(self.expression(args, region)?),
            "exit" => Node::Exit,
            "exitif" => Node::ExitIf(self.expression(args, region)?),
            "for" => self.parse_for(args, region)?,
            "foreach" => self.parse_foreach(args, region, false)?,
            "forelse" => self.parse_foreach(args, region, true)?,
            "while" => {
                let condition = self.expression(args, region)?;
                let (body, closer) = self.parse_until(&["endwhile"])?;
                self.closed(closer)?;
                Node::While { condition, body }
            }
            "section" => Node::SectionBegin(self.expression(args, region)?),
            "stop" => Node::SectionEnd(SectionMode::Stop),
            "show" => Node::SectionEnd(SectionMode::Show),
            "overwrite" => Node::SectionEnd(SectionMode::Overwrite),
            "yield" => {
                let inner = strip_parens(args);
                let mut parts = split_top_level(inner, ',').into_iter();
                let name = match parts.next() {
                    Some(part) => self.expression(part, region)?,
                    None => return Err(unexpected(self.artifact, &Closer { op, args, region })),
                };
                let default = parts
                    .next()
                    .map(|part| self.expression(part, region))
                    .transpose()?;
                Node::Yield { name, default }
            }
            "extends" => Node::Extends(self.expression(args, region)?),
            "include" => Node::Include(self.expression(args, region)?),
            "json" => Node::Json(self.expression(args, region)?),
            "set" => {
                let Some((target, text)) = args.split_once('=') else {
                    return Err(Error::build(UNEXPECTED_TOKEN)
                        .with_pointer(self.artifact, region)
                        .with_help("an assignment requires `name = expression`"));
                };
                Node::Set {
                    target: target.trim().to_string(),
                    expr: self.expression(text, region)?,
                }
            }
            "unset" => {
                let mut names = Vec::new();
                for part in split_top_level(strip_parens(args), ',') {
                    match self.expression(part, region)? {
                        Expr::Variable(name) => names.push(name),
                        _ => {
                            return Err(Error::build(UNEXPECTED_TOKEN)
                                .with_pointer(self.artifact, region)
                                .with_help("only variables can be unset"))
                        }
                    }
                }
                Node::Unset(names)
            }
            "do" => Node::Do(
                expr::parse_statement(strip_parens(args))
                    .map_err(|error| error.with_pointer(self.artifact, region))?,
            ),
            "method" => Node::Method(self.expression(args, region)?),
            _ => {
                return Err(Error::build(UNEXPECTED_TOKEN)
                    .with_pointer(self.artifact, region)
                    .with_help(format!("`{op}` is not a recognized instruction")))
            }
        };

        Ok(Some(node))
    }

    fn parse_if(&mut self, condition: Expr) -> Result<Node<'artifact>, Error> {
        let mut arms = Vec::new();
        let mut condition = condition;

        loop {
            let (body, closer) = self.parse_until(&["elseif", "else", "endif"])?;
            let Some(closer) = closer else {
                return Err(error_eof(self.artifact));
            };
            arms.push((condition, body));
            match closer.op {
                "elseif" => condition = self.expression(closer.args, closer.region)?,
                "else" => {
                    let (fallback, closer) = self.parse_until(&["endif"])?;
                    self.closed(closer)?;
                    return Ok(Node::If {
                        arms,
                        fallback: Some(fallback),
                    });
                }
                _ => return Ok(Node::If { arms, fallback: None }),
            }
        }
    }

    fn parse_switch(
        &mut self,
        args: &'artifact str,
        region: Region,
    ) -> Result<Node<'artifact>, Error> {
        let subject = self.expression(args, region)?;
        let mut cases = Vec::new();

        // Text between the switch and its first case has nowhere to go.
        let (_, mut closer) = self.parse_until(&["case", "default", "endswitch"])?;
        loop {
            let Some(found) = closer else {
                return Err(error_eof(self.artifact));
            };
            match found.op {
                "endswitch" => return Ok(Node::Switch { subject, cases }),
                op => {
                    let value = match op {
                        "case" => Some(self.expression(found.args, found.region)?),
                        _ => None,
                    };
                    let (body, next) = self.parse_until(&["case", "default", "endswitch"])?;
                    cases.push((value, body));
                    closer = next;
                }
            }
        }
    }

    fn parse_for(
        &mut self,
        args: &'artifact str,
        region: Region,
    ) -> Result<Node<'artifact>, Error> {
        let inner = strip_parens(args);
        let parts = split_top_level(inner, ';');
        let [init, condition, step] = parts.as_slice() else {
            return Err(Error::build(UNEXPECTED_TOKEN)
                .with_pointer(self.artifact, region)
                .with_help("a `for` requires `initializer; condition; step`"));
        };

        let init = self.statement_opt(init, region)?;
        let condition = match condition.trim() {
            "" => None,
            text => Some(self.expression(text, region)?),
        };
        let step = self.statement_opt(step, region)?;
        let (body, closer) = self.parse_until(&["endfor"])?;
        self.closed(closer)?;

        Ok(Node::For {
            init,
            condition,
            step,
            body,
        })
    }

    fn parse_foreach(
        &mut self,
        args: &'artifact str,
        region: Region,
        with_empty: bool,
    ) -> Result<Node<'artifact>, Error> {
        let Some(at) = args.rfind(" as ") else {
            return Err(Error::build(UNEXPECTED_TOKEN)
                .with_pointer(self.artifact, region)
                .with_help("iteration requires `(iterable) as $binding`"));
        };
        let subject = self.expression(&args[..at], region)?;
        let binding = self.binding(&args[at + 4..], region)?;

        if !with_empty {
            let (body, closer) = self.parse_until(&["endforeach"])?;
            self.closed(closer)?;
            return Ok(Node::Foreach {
                subject,
                binding,
                body,
                empty: None,
            });
        }

        let (body, closer) = self.parse_until(&["empty", "endforelse"])?;
        let Some(closer) = closer else {
            return Err(error_eof(self.artifact));
        };
        let empty = match closer.op {
            "empty" => {
                let (nodes, closer) = self.parse_until(&["endforelse"])?;
                self.closed(closer)?;
                Some(nodes)
            }
            _ => None,
        };

        Ok(Node::Foreach {
            subject,
            binding,
            body,
            empty,
        })
    }

    /// Parse `$value` or `$key => $value`.
    fn binding(&self, text: &str, region: Region) -> Result<Binding, Error> {
        let variable = |part: &str| -> Result<String, Error> {
            let part = part.trim();
            match expr::parse(part)? {
                Expr::Variable(name) => Ok(name),
                _ => Err(Error::build(UNEXPECTED_TOKEN)
                    .with_pointer(self.artifact, region)
                    .with_help(format!("`{part}` cannot be bound by iteration"))),
            }
        };

        match text.split_once("=>") {
            Some((key, value)) => Ok(Binding {
                key: Some(variable(key)?),
                value: variable(value)?,
            }),
            None => Ok(Binding {
                key: None,
                value: variable(text)?,
            }),
        }
    }

    fn expression(&self, text: &str, region: Region) -> Result<Expr, Error> {
        expr::parse(text).map_err(|error| error.with_pointer(self.artifact, region))
    }

    fn statement_opt(&self, text: &str, region: Region) -> Result<Option<Statement>, Error> {
        match text.trim() {
            "" => Ok(None),
            text => expr::parse_statement(text)
                .map(Some)
                .map_err(|error| error.with_pointer(self.artifact, region)),
        }
    }

    fn levels(&self, args: &str) -> usize {
        args.trim().parse::<usize>().unwrap_or(1).max(1)
    }

    fn closed(&self, closer: Option<Closer>) -> Result<(), Error> {
        match closer {
            Some(_) => Ok(()),
            None => Err(error_eof(self.artifact)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, Program, SectionMode};
    use crate::log::{UNEXPECTED_EOF, UNEXPECTED_TOKEN};

    #[test]
    fn test_parse_text_and_out() {
        let program = Program::parse("Hello <?v out $name ?>!").unwrap();

        assert_eq!(program.nodes.len(), 3);
        assert!(matches!(program.nodes[0], Node::Text("Hello ")));
        assert!(matches!(program.nodes[1], Node::Out(_)));
        assert!(matches!(program.nodes[2], Node::Text("!")));
    }

    #[test]
    fn test_parse_swallows_one_newline() {
        let program = Program::parse("<?v note ?>\ntext").unwrap();

        assert_eq!(program.nodes, vec![Node::Text("text")]);
    }

    #[test]
    fn test_parse_if_chain() {
        let program =
            Program::parse("<?v if ($a) ?>a<?v elseif ($b) ?>b<?v else ?>c<?v endif ?>").unwrap();

        let Node::If { arms, fallback } = &program.nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(arms.len(), 2);
        assert!(fallback.is_some());
    }

    #[test]
    fn test_parse_unclosed_if() {
        let error = Program::parse("<?v if ($a) ?>a").unwrap_err();

        assert_eq!(error.get_reason(), UNEXPECTED_EOF);
    }

    #[test]
    fn test_parse_stray_closer() {
        let error = Program::parse("text <?v endif ?>").unwrap_err();

        assert_eq!(error.get_reason(), UNEXPECTED_TOKEN);
    }

    #[test]
    fn test_parse_switch_discards_leading_text() {
        let program = Program::parse(
            "<?v switch ($a) ?>dropped<?v case 1 ?>one<?v default ?>other<?v endswitch ?>",
        )
        .unwrap();

        let Node::Switch { cases, .. } = &program.nodes[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(cases[0].0.is_some());
        assert!(cases[1].0.is_none());
    }

    #[test]
    fn test_parse_foreach_binding() {
        let program =
            Program::parse("<?v foreach ($users) as $id => $user ?>x<?v endforeach ?>").unwrap();

        let Node::Foreach { binding, .. } = &program.nodes[0] else {
            panic!("expected foreach");
        };
        assert_eq!(binding.key.as_deref(), Some("id"));
        assert_eq!(binding.value, "user");
    }

    #[test]
    fn test_parse_verbatim() {
        let program =
            Program::parse("<?v verbatim ?>{{ raw }} @if<?v endverbatim ?>").unwrap();

        assert_eq!(program.nodes, vec![Node::Text("{{ raw }} @if")]);
    }

    #[test]
    fn test_parse_unclosed_tag_is_text() {
        let program = Program::parse("text <?v out $a").unwrap();

        assert_eq!(program.nodes, vec![Node::Text("text <?v out $a")]);
    }

    #[test]
    fn test_parse_section_modes() {
        let program =
            Program::parse("<?v section 'a' ?>x<?v show ?><?v section 'b' ?>y<?v overwrite ?>")
                .unwrap();

        assert!(matches!(program.nodes[2], Node::SectionEnd(SectionMode::Show)));
        assert!(matches!(
            program.nodes[5],
            Node::SectionEnd(SectionMode::Overwrite)
        ));
    }

    #[test]
    fn test_parse_for_parts() {
        let program =
            Program::parse("<?v for ($i = 0; $i < 3; $i++) ?>.<?v endfor ?>").unwrap();

        let Node::For {
            init,
            condition,
            step,
            ..
        } = &program.nodes[0]
        else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(condition.is_some());
        assert!(step.is_some());
    }

    #[test]
    fn test_parse_unknown_instruction() {
        let error = Program::parse("<?v bogus ?>").unwrap_err();

        assert_eq!(error.get_reason(), UNEXPECTED_TOKEN);
    }
}
