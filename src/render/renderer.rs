use super::{
    block::BlockStack,
    compare::{equals_values, is_truthy, stringify},
    expr::{eval, run, Expr, Scope},
    loops::LoopStack,
    program::{Binding, Node, Program, SectionMode},
};
use crate::{
    engine::Engine,
    log::{Error, EMPTY_BLOCK_STACK, INCOMPATIBLE_TYPES},
    pipe::escape,
    store::Store,
};
use serde_json::{json, Value};
use std::collections::VecDeque;

/// Control flow raised by a node and handled by an enclosing construct.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Signal {
    None,
    Break(usize),
    Continue(usize),
    Exit,
}

/// What a loop does after one pass of its body.
enum Flow {
    Next,
    Stop,
    Propagate(Signal),
}

fn flow(signal: Signal) -> Flow {
    match signal {
        Signal::None | Signal::Continue(1) => Flow::Next,
        Signal::Break(1) => Flow::Stop,
        Signal::Continue(levels) => Flow::Propagate(Signal::Continue(levels - 1)),
        Signal::Break(levels) => Flow::Propagate(Signal::Break(levels - 1)),
        Signal::Exit => Flow::Propagate(Signal::Exit),
    }
}

/// Executes compiled artifacts against a [`Scope`].
///
/// Rendering walks a queue of templates. The entry template runs first,
/// and an `extends` instruction pushes the parent onto the back of the
/// queue, so layouts render after the templates that fill their blocks.
pub struct Renderer<'engine> {
    engine: &'engine Engine,
    scope: Scope,
    blocks: BlockStack,
    captures: Vec<String>,
    loops: LoopStack,
    queue: VecDeque<String>,
    halted: bool,
}

impl<'engine> Renderer<'engine> {
    /// Create a new Renderer over the [`Engine`] and [`Store`].
    pub fn new(engine: &'engine Engine, store: &Store) -> Self {
        Self {
            engine,
            scope: Scope::new(store),
            blocks: BlockStack::new(),
            captures: Vec::new(),
            loops: LoopStack::new(),
            queue: VecDeque::new(),
            halted: false,
        }
    }

    /// Render the named template and every layout it extends.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a template cannot be compiled or
    /// executed. The error carries the name of the template closest to
    /// the failure.
    pub fn render(mut self, name: &str) -> Result<String, Error> {
        self.queue.push_back(name.to_string());

        while let Some(next) = self.queue.pop_front() {
            let artifact = self.engine.compile(&next)?;
            let program =
                Program::parse(&artifact.text).map_err(|error| error.with_name(&next))?;

            self.blocks.begin("content");
            self.captures.push(String::new());
            let depth = self.captures.len();

            let signal = self
                .execute(&program.nodes)
                .map_err(|error| error.with_name(&next))?;
            if let Signal::Exit = signal {
                self.halted = true;
            }

            // An exit can leave sections open, close them on its behalf.
            while self.captures.len() > depth {
                let captured = self.captures.pop().unwrap_or_default();
                self.blocks.end(captured, false)?;
            }
            let captured = self.captures.pop().unwrap_or_default();
            self.blocks.end(captured, true)?;

            if self.halted {
                break;
            }
        }

        Ok(self.blocks.get("content", "").to_string())
    }

    /// Append text to the innermost capture.
    fn write(&mut self, text: &str) -> Result<(), Error> {
        match self.captures.last_mut() {
            Some(capture) => {
                capture.push_str(text);
                Ok(())
            }
            None => Err(Error::build(EMPTY_BLOCK_STACK)
                .with_help("output was produced outside of any block")),
        }
    }

    fn execute(&mut self, nodes: &[Node]) -> Result<Signal, Error> {
        for node in nodes {
            match node {
                Node::Text(text) => self.write(text)?,
                Node::Literal(text) => self.write(text)?,
                Node::Out(expression) => {
                    let value = eval(expression, &self.scope)?;
                    self.write(&escape(&stringify(&value)))?;
                }
                Node::Raw(expression) => {
                    let value = eval(expression, &self.scope)?;
                    self.write(&stringify(&value))?;
                }
                Node::If { arms, fallback } => {
                    let signal = self.execute_if(arms, fallback)?;
                    if signal != Signal::None {
                        return Ok(signal);
                    }
                }
                Node::Switch { subject, cases } => {
                    let signal = self.execute_switch(subject, cases)?;
                    if signal != Signal::None {
                        return Ok(signal);
                    }
                }
                Node::Break(levels) => return Ok(Signal::Break(*levels)),
                Node::Continue(levels) => return Ok(Signal::Continue(*levels)),
                Node::BreakIf(condition) => {
                    if is_truthy(&eval(condition, &self.scope)?) {
                        return Ok(Signal::Break(1));
                    }
                }
                Node::ContinueIf(condition) => {
                    if is_truthy(&eval(condition, &self.scope)?) {
                        return Ok(Signal::Continue(1));
                    }
                }
                Node::Exit => return Ok(Signal::Exit),
                Node::ExitIf(condition) => {
                    if is_truthy(&eval(condition, &self.scope)?) {
                        return Ok(Signal::Exit);
                    }
                }
                Node::For {
                    init,
                    condition,
                    step,
                    body,
                } => {
                    let signal = self.execute_for(init, condition, step, body)?;
                    if signal != Signal::None {
                        return Ok(signal);
                    }
                }
                Node::Foreach {
                    subject,
                    binding,
                    body,
                    empty,
                } => {
                    let signal = self.execute_foreach(subject, binding, body, empty)?;
                    if signal != Signal::None {
                        return Ok(signal);
                    }
                }
                Node::While { condition, body } => {
                    let signal = self.execute_while(condition, body)?;
                    if signal != Signal::None {
                        return Ok(signal);
                    }
                }
                Node::SectionBegin(name) => {
                    let name = stringify(&eval(name, &self.scope)?);
                    self.blocks.begin(name);
                    self.captures.push(String::new());
                }
                Node::SectionEnd(mode) => {
                    let captured = self.captures.pop().ok_or_else(|| {
                        Error::build(EMPTY_BLOCK_STACK)
                            .with_help("a section ended that never began")
                    })?;
                    match mode {
                        SectionMode::Stop => {
                            self.blocks.end(captured, false)?;
                        }
                        SectionMode::Overwrite => {
                            self.blocks.end(captured, true)?;
                        }
                        SectionMode::Show => {
                            let name = self.blocks.end(captured, false)?;
                            let text = self.blocks.get(&name, "").to_string();
                            self.write(&text)?;
                        }
                    }
                }
                Node::Yield { name, default } => {
                    let name = stringify(&eval(name, &self.scope)?);
                    let default = match default {
                        Some(expression) => stringify(&eval(expression, &self.scope)?),
                        None => String::new(),
                    };
                    let text = self.blocks.get(&name, &default).to_string();
                    self.write(&text)?;
                }
                Node::Extends(name) => {
                    let name = stringify(&eval(name, &self.scope)?);
                    self.queue.push_back(name);
                }
                Node::Include(name) => {
                    let name = stringify(&eval(name, &self.scope)?);
                    let signal = self.execute_include(&name)?;
                    if signal != Signal::None {
                        return Ok(signal);
                    }
                }
                Node::Json(expression) => {
                    let value = eval(expression, &self.scope)?;
                    let text = serde_json::to_string(&value).map_err(|error| {
                        Error::build(format!("value is not encodable: {error}"))
                    })?;
                    self.write(&hex_escape(&text))?;
                }
                Node::Method(expression) => {
                    let value = eval(expression, &self.scope)?;
                    self.write(&escape(&stringify(&value).to_uppercase()))?;
                }
                Node::Set { target, expr } => {
                    let value = eval(expr, &self.scope)?;
                    self.scope.set(target.clone(), value);
                }
                Node::Unset(names) => {
                    for name in names {
                        self.scope.unset(name);
                    }
                }
                Node::Do(statement) => {
                    run(statement, &mut self.scope)?;
                }
            }
        }

        Ok(Signal::None)
    }

    fn execute_if(
        &mut self,
        arms: &[(Expr, Vec<Node>)],
        fallback: &Option<Vec<Node>>,
    ) -> Result<Signal, Error> {
        for (condition, body) in arms {
            if is_truthy(&eval(condition, &self.scope)?) {
                return self.execute(body);
            }
        }
        match fallback {
            Some(body) => self.execute(body),
            None => Ok(Signal::None),
        }
    }

    /// Execute the first matching case and fall through until a break.
    fn execute_switch(
        &mut self,
        subject: &Expr,
        cases: &[(Option<Expr>, Vec<Node>)],
    ) -> Result<Signal, Error> {
        let subject = eval(subject, &self.scope)?;
        let mut start = None;
        for (index, (value, _)) in cases.iter().enumerate() {
            if let Some(expression) = value {
                let value = eval(expression, &self.scope)?;
                if equals_values(&subject, &value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|(value, _)| value.is_none()));
        let Some(start) = start else {
            return Ok(Signal::None);
        };

        for (_, body) in &cases[start..] {
            let signal = self.execute(body)?;
            match signal {
                Signal::None => {}
                Signal::Break(1) => break,
                Signal::Break(levels) => return Ok(Signal::Break(levels - 1)),
                other => return Ok(other),
            }
        }

        Ok(Signal::None)
    }

    fn execute_for(
        &mut self,
        init: &Option<super::expr::Statement>,
        condition: &Option<Expr>,
        step: &Option<super::expr::Statement>,
        body: &[Node],
    ) -> Result<Signal, Error> {
        if let Some(init) = init {
            run(init, &mut self.scope)?;
        }
        loop {
            if let Some(condition) = condition {
                if !is_truthy(&eval(condition, &self.scope)?) {
                    break;
                }
            }
            let signal = self.execute(body)?;
            match flow(signal) {
                Flow::Next => {}
                Flow::Stop => break,
                Flow::Propagate(signal) => return Ok(signal),
            }
            if let Some(step) = step {
                run(step, &mut self.scope)?;
            }
        }

        Ok(Signal::None)
    }

    fn execute_while(&mut self, condition: &Expr, body: &[Node]) -> Result<Signal, Error> {
        while is_truthy(&eval(condition, &self.scope)?) {
            let signal = self.execute(body)?;
            match flow(signal) {
                Flow::Next => {}
                Flow::Stop => break,
                Flow::Propagate(signal) => return Ok(signal),
            }
        }

        Ok(Signal::None)
    }

    fn execute_foreach(
        &mut self,
        subject: &Expr,
        binding: &Binding,
        body: &[Node],
        empty: &Option<Vec<Node>>,
    ) -> Result<Signal, Error> {
        let value = eval(subject, &self.scope)?;
        let entries = iterable(&value)?;

        if entries.is_empty() {
            return match empty {
                Some(body) => self.execute(body),
                None => Ok(Signal::None),
            };
        }

        let saved = self.scope.get("loop").cloned();
        self.loops.push(Some(entries.len()));

        let mut propagate = Signal::None;
        for (key, item) in entries {
            self.loops.advance();
            if let Some(name) = &binding.key {
                self.scope.set(name.clone(), key);
            }
            self.scope.set(binding.value.clone(), item);
            if let Some(value) = self.loops.value() {
                self.scope.set("loop", value);
            }

            let signal = self.execute(body)?;
            match flow(signal) {
                Flow::Next => {}
                Flow::Stop => break,
                Flow::Propagate(signal) => {
                    propagate = signal;
                    break;
                }
            }
        }

        self.loops.pop();
        match self.loops.value() {
            Some(value) => self.scope.set("loop", value),
            None => match saved {
                Some(value) => self.scope.set("loop", value),
                None => self.scope.unset("loop"),
            },
        }

        Ok(propagate)
    }

    fn execute_include(&mut self, name: &str) -> Result<Signal, Error> {
        let artifact = self.engine.compile(name)?;
        let program = Program::parse(&artifact.text).map_err(|error| error.with_name(name))?;

        self.execute(&program.nodes)
            .map_err(|error| error.with_name(name))
    }
}

/// Return the entries of an iterable [`Value`] as key and item pairs.
///
/// Null iterates zero times.
fn iterable(value: &Value) -> Result<Vec<(Value, Value)>, Error> {
    match value {
        Value::Array(array) => Ok(array
            .iter()
            .enumerate()
            .map(|(index, item)| (json!(index), item.clone()))
            .collect()),
        Value::Object(object) => Ok(object
            .iter()
            .map(|(key, item)| (json!(key), item.clone()))
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::build(INCOMPATIBLE_TYPES)
            .with_help(format!("`{other}` is not iterable"))),
    }
}

/// Escape characters that are unsafe to embed in HTML, without
/// disturbing the JSON structure.
fn hex_escape(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => output.push_str("\\u003C"),
            '>' => output.push_str("\\u003E"),
            '&' => output.push_str("\\u0026"),
            '\'' => output.push_str("\\u0027"),
            _ => output.push(c),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Store};
    use serde_json::json;

    fn render(source: &str, store: &Store) -> String {
        let mut engine = Engine::default();
        engine.add_template("template", source);
        engine.render("template", store).unwrap()
    }

    #[test]
    fn test_echo_escapes() {
        let store = Store::new().with_must("html", "<b>hi</b>");

        assert_eq!(render("{{ $html }}", &store), "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(render("{!! $html !!}", &store), "<b>hi</b>");
        assert_eq!(render("{! $html !}", &store), "<b>hi</b>");
    }

    #[test]
    fn test_echo_null_prints_nothing() {
        assert_eq!(render("[{{ $missing }}]", &Store::new()), "[]");
    }

    #[test]
    fn test_echo_default() {
        assert_eq!(
            render("{{ $name or 'guest' }}", &Store::new()),
            "guest"
        );
    }

    #[test]
    fn test_if_chain() {
        let source = "@if ($n > 5)big@elseif ($n > 2)medium@else\nsmall@endif";

        assert_eq!(render(source, &Store::new().with_must("n", 9)), "big");
        assert_eq!(render(source, &Store::new().with_must("n", 3)), "medium");
        assert_eq!(render(source, &Store::new().with_must("n", 1)), "small");
    }

    #[test]
    fn test_unless_and_isset() {
        assert_eq!(
            render("@unless ($a)no@endunless", &Store::new()),
            "no"
        );
        assert_eq!(
            render(
                "@isset($name)hi @endisset{{ $name }}",
                &Store::new().with_must("name", "sam")
            ),
            "hi sam"
        );
    }

    #[test]
    fn test_foreach_with_loop_metadata() {
        let store = Store::new().with_must("items", json!(["a", "b", "c"]));
        let source =
            "@foreach ($items as $item){{ $loop->index }}:{{ $item }};@endforeach";

        assert_eq!(render(source, &store), "0:a;1:b;2:c;");
    }

    #[test]
    fn test_foreach_first_last() {
        let store = Store::new().with_must("items", json!([1, 2, 3]));
        let source = "@foreach ($items as $i)@if ($loop->first)[@endif{{ $i }}@if ($loop->last)]@endif@endforeach";

        assert_eq!(render(source, &store), "[123]");
    }

    #[test]
    fn test_foreach_keys() {
        let store = Store::new().with_must("map", json!({"a": 1, "b": 2}));
        let source = "@foreach ($map as $k => $v){{ $k }}={{ $v }};@endforeach";

        assert_eq!(render(source, &store), "a=1;b=2;");
    }

    #[test]
    fn test_forelse_empty() {
        let source = "@forelse ($items as $item){{ $item }}@empty\nnone@endforelse";

        assert_eq!(render(source, &Store::new()), "none");
        assert_eq!(
            render(source, &Store::new().with_must("items", json!([7]))),
            "7"
        );
    }

    #[test]
    fn test_nested_break_levels() {
        let store = Store::new()
            .with_must("outer", json!([1, 2]))
            .with_must("inner", json!([1, 2, 3]));
        let source = "@foreach ($outer as $o)@foreach ($inner as $i){{ $i }}@break(2)@endforeach@endforeach";

        assert_eq!(render(source, &store), "1");
    }

    #[test]
    fn test_continue_condition() {
        let store = Store::new().with_must("items", json!([1, 2, 3, 4]));
        let source =
            "@foreach ($items as $i)@continue($i % 2 == 0){{ $i }}@endforeach";

        assert_eq!(render(source, &store), "13");
    }

    #[test]
    fn test_for_loop() {
        assert_eq!(
            render("@for ($i = 0; $i < 3; $i++){{ $i }}@endfor", &Store::new()),
            "012"
        );
    }

    #[test]
    fn test_while_loop() {
        let source = "@php($n = 3)@while ($n > 0){{ $n }}@php($n -= 1)@endwhile";

        assert_eq!(render(source, &Store::new()), "321");
    }

    #[test]
    fn test_switch_fall_through() {
        let source = "@switch($n)@case(1)one@break\n@case(2)two@case(3)three@break\n@default\nother@endswitch";

        assert_eq!(render(source, &Store::new().with_must("n", 1)), "one");
        assert_eq!(render(source, &Store::new().with_must("n", 2)), "twothree");
        assert_eq!(render(source, &Store::new().with_must("n", 9)), "other");
    }

    #[test]
    fn test_exit_stops_render() {
        assert_eq!(render("before@exit\nafter", &Store::new()), "before");
    }

    #[test]
    fn test_set_and_unset() {
        assert_eq!(
            render("@set('page', 2){{ $page }}", &Store::new()),
            "2"
        );
        assert_eq!(
            render(
                "@unset($name)[{{ $name }}]",
                &Store::new().with_must("name", "x")
            ),
            "[]"
        );
    }

    #[test]
    fn test_sections_extend_layout() {
        let mut engine = Engine::default();
        engine.add_template("layout", "<title>@yield('title', 'Home')</title> @yield('body')");
        engine.add_template(
            "page",
            "@extends('layout')@section('body')welcome@stop",
        );

        assert_eq!(
            engine.render("page", &Store::new()).unwrap(),
            "<title>Home</title> welcome"
        );
    }

    #[test]
    fn test_section_append_and_overwrite() {
        let mut engine = Engine::default();
        engine.add_template(
            "layout",
            "@yield('side')|@yield('main')",
        );
        engine.add_template(
            "page",
            "@extends('layout')@section('side')a@stop@section('side')b@stop@section('main')x@stop@section('main')y@overwrite",
        );

        assert_eq!(engine.render("page", &Store::new()).unwrap(), "ab|y");
    }

    #[test]
    fn test_section_show_inline() {
        assert_eq!(
            render("@section('note')text@show", &Store::new()),
            "text"
        );
    }

    #[test]
    fn test_include() {
        let mut engine = Engine::default();
        engine.add_template("partial", "[{{ $name }}]");
        engine.add_template("page", "before @include('partial') after");

        assert_eq!(
            engine
                .render("page", &Store::new().with_must("name", "sam"))
                .unwrap(),
            "before [sam] after"
        );
    }

    #[test]
    fn test_json_hex_escapes() {
        let store = Store::new().with_must("data", json!({"tag": "<b>"}));

        assert_eq!(
            render("@json($data)", &store),
            "{\"tag\":\"\\u003Cb\\u003E\"}"
        );
    }

    #[test]
    fn test_method_field() {
        let output = render("@method('put')", &Store::new());

        assert_eq!(
            output,
            "<input type=\"hidden\" name=\"_method\" value=\"PUT\">\n"
        );
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(render("A{{-- hidden --}}B", &Store::new()), "AB");
    }

    #[test]
    fn test_escaped_directive_and_echo() {
        assert_eq!(render("@@if stays", &Store::new()), "@if stays");
        assert_eq!(render("@{{ $name }}", &Store::new()), "{{ $name }}");
    }

    #[test]
    fn test_echo_trailing_newline_survives() {
        let store = Store::new().with_must("a", 1);

        // The newline after an echo survives, the one after a statement
        // does not.
        assert_eq!(render("{{ $a }}\nnext", &store), "1\nnext");
        assert_eq!(render("@if (true)\nyes@endif", &store), "yes");
    }

    #[test]
    fn test_verbatim_block() {
        assert_eq!(
            render("@php not a @directive here @endphp", &Store::new()),
            " not a @directive here "
        );
    }

    #[test]
    fn test_missing_template_error() {
        let engine = Engine::default();
        let error = engine.render("ghost", &Store::new()).unwrap_err();

        assert_eq!(error.get_reason(), crate::log::SOURCE_NOT_FOUND);
    }
}
