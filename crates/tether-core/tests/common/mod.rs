//! Shared test engine
//!
//! `ScriptEngine` is a tiny scripted stand-in for a real engine. It keeps a
//! heap of objects, arrays and functions keyed by reference id, understands a
//! handful of fixed "programs", and records which thread did what so tests
//! can check thread confinement.
//!
//! Programs understood by `eval`:
//!
//! - `42`, `'text'`, `true`, `undefined`: literals
//! - `a + b`: integer addition
//! - `{}` / `[1, 2, 3]`: fresh object / integer array
//! - `function sum`: function adding up the integers in its argument array
//! - `throw msg`: execute error with message `msg`
//! - `spin`: loops until interrupted (polls the interrupt)
//! - `sleep N`: sleeps N ms ignoring interrupts, then returns N
//! - anything else: parse error

#![allow(dead_code)]

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tether_core::tether_sdk::{
    CallbackMaker, CallbackSink, EngineCore, Evaluator, HeapReporter, Interrupt, ObjectManipulator,
    Value, ValueData, ValueFactory, ValueHandle, ValueKind, ValuePtr,
};
use tether_core::{Session, SessionOptions};

/// How long tests wait for a callback before failing
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// What the engine did, and on which thread
#[derive(Debug, Default)]
pub struct EngineLog {
    pub engine_thread: Option<ThreadId>,
    pub contexts_created: Vec<ThreadId>,
    pub contexts_released: Vec<ThreadId>,
    pub refs_released: Vec<(u64, ThreadId)>,
    pub evals: usize,
    pub outstanding_refs: usize,
    pub dropped: bool,
}

#[derive(Debug, Clone)]
enum Slot {
    Int(i64),
    Text(String),
    Bool(bool),
    Undefined,
    Ref(u64),
}

enum HeapObject {
    Object(BTreeMap<String, Slot>),
    Array(Vec<Slot>),
    Sum,
    Callback { callback_id: u64, sink: CallbackSink },
}

impl HeapObject {
    fn kind(&self) -> ValueKind {
        match self {
            HeapObject::Object(_) => ValueKind::Object,
            HeapObject::Array(_) => ValueKind::Array,
            HeapObject::Sum | HeapObject::Callback { .. } => ValueKind::Function,
        }
    }
}

/// Execution context; deliberately `!Send`
pub struct ScriptContext {
    pub id: u32,
    _not_send: PhantomData<Rc<()>>,
}

/// Scripted engine; see the module docs
pub struct ScriptEngine {
    heap: HashMap<u64, HeapObject>,
    next_ref: u64,
    log: Arc<Mutex<EngineLog>>,
}

impl ScriptEngine {
    pub fn new(log: Arc<Mutex<EngineLog>>) -> Self {
        log.lock().engine_thread = Some(thread::current().id());
        Self {
            heap: HashMap::new(),
            next_ref: 1,
            log,
        }
    }

    fn alloc(&mut self, object: HeapObject) -> u64 {
        let r = self.next_ref;
        self.next_ref += 1;
        self.heap.insert(r, object);
        r
    }

    /// Hand out a new reference value to `r`
    fn reference(&mut self, r: u64, factory: &ValueFactory) -> ValuePtr {
        let Some(object) = self.heap.get(&r) else {
            return factory.error("dangling reference", ValueKind::ExecuteError);
        };
        let data = match object {
            HeapObject::Array(items) => ValueData::Length(items.len()),
            _ => ValueData::Empty,
        };
        let kind = object.kind();
        self.log.lock().outstanding_refs += 1;
        factory.new_ref(kind, data, r)
    }

    fn to_value(&mut self, slot: &Slot, factory: &ValueFactory) -> ValuePtr {
        match slot {
            Slot::Int(i) => factory.integer(*i),
            Slot::Text(s) => factory.string(s.clone()),
            Slot::Bool(b) => factory.boolean(*b),
            Slot::Undefined => factory.undefined(),
            Slot::Ref(r) => self.reference(*r, factory),
        }
    }

    fn to_slot(value: &Value) -> Slot {
        if let Some(r) = value.engine_ref() {
            return Slot::Ref(r);
        }
        match value.data() {
            ValueData::Integer(i) => Slot::Int(*i),
            ValueData::Text(s) => Slot::Text(s.clone()),
            ValueData::Bool(b) => Slot::Bool(*b),
            _ => Slot::Undefined,
        }
    }

    fn key_of(value: &Value) -> Option<String> {
        match value.data() {
            ValueData::Text(s) => Some(s.clone()),
            ValueData::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }

    fn not_an_object(factory: &ValueFactory) -> ValuePtr {
        factory.error("TypeError: not an object", ValueKind::ExecuteError)
    }

    fn run_program(
        &mut self,
        code: &str,
        factory: &ValueFactory,
        interrupt: &Interrupt,
    ) -> ValuePtr {
        let code = code.trim();

        if let Ok(i) = code.parse::<i64>() {
            return factory.integer(i);
        }
        if let Some(text) = code.strip_prefix('\'').and_then(|c| c.strip_suffix('\'')) {
            return factory.string(text);
        }
        match code {
            "true" => return factory.boolean(true),
            "false" => return factory.boolean(false),
            "undefined" => return factory.undefined(),
            "{}" => {
                let r = self.alloc(HeapObject::Object(BTreeMap::new()));
                return self.reference(r, factory);
            }
            "function sum" => {
                let r = self.alloc(HeapObject::Sum);
                return self.reference(r, factory);
            }
            "spin" => {
                while !interrupt.check() {
                    thread::sleep(Duration::from_millis(1));
                }
                return factory.error("execution terminated", ValueKind::Terminated);
            }
            _ => {}
        }
        if let Some(items) = code.strip_prefix('[').and_then(|c| c.strip_suffix(']')) {
            let slots: Option<Vec<Slot>> = items
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<i64>().ok().map(Slot::Int))
                .collect();
            return match slots {
                Some(slots) => {
                    let r = self.alloc(HeapObject::Array(slots));
                    self.reference(r, factory)
                }
                None => factory.error("SyntaxError: bad array literal", ValueKind::ParseError),
            };
        }
        if let Some(msg) = code.strip_prefix("throw ") {
            return factory.error(msg, ValueKind::ExecuteError);
        }
        if let Some(ms) = code.strip_prefix("sleep ").and_then(|n| n.parse::<u64>().ok()) {
            thread::sleep(Duration::from_millis(ms));
            return factory.integer(ms as i64);
        }
        if let Some((a, b)) = code.split_once('+') {
            if let (Ok(a), Ok(b)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
                return factory.integer(a + b);
            }
        }
        factory.error(format!("SyntaxError: unexpected input '{}'", code), ValueKind::ParseError)
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.log.lock().dropped = true;
    }
}

impl EngineCore for ScriptEngine {
    type Context = ScriptContext;

    fn create_context(&mut self, _factory: &ValueFactory) -> ScriptContext {
        let mut log = self.log.lock();
        log.contexts_created.push(thread::current().id());
        ScriptContext {
            id: log.contexts_created.len() as u32,
            _not_send: PhantomData,
        }
    }

    fn release_context(&mut self, _context: ScriptContext) {
        self.log.lock().contexts_released.push(thread::current().id());
    }

    fn release_ref(&mut self, engine_ref: u64) {
        let mut log = self.log.lock();
        log.refs_released.push((engine_ref, thread::current().id()));
        log.outstanding_refs -= 1;
    }
}

impl Evaluator for ScriptEngine {
    fn eval(
        &mut self,
        _: &ScriptContext,
        code: &Value,
        factory: &ValueFactory,
        interrupt: &Interrupt,
    ) -> ValuePtr {
        self.log.lock().evals += 1;
        match code.to_text() {
            Ok(code) => {
                let code = code.to_string();
                self.run_program(&code, factory, interrupt)
            }
            Err(e) => factory.error(e.to_string(), ValueKind::ExecuteError),
        }
    }
}

impl ObjectManipulator for ScriptEngine {
    fn identity_hash(
        &mut self,
        _: &ScriptContext,
        obj: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr {
        match obj.engine_ref() {
            Some(r) => factory.integer((r as i64) * 31),
            None => Self::not_an_object(factory),
        }
    }

    fn own_property_names(
        &mut self,
        _: &ScriptContext,
        obj: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr {
        let names: Vec<Slot> = match obj.engine_ref().and_then(|r| self.heap.get(&r)) {
            Some(HeapObject::Object(props)) => props.keys().cloned().map(Slot::Text).collect(),
            Some(HeapObject::Array(items)) => {
                (0..items.len()).map(|i| Slot::Text(i.to_string())).collect()
            }
            Some(_) => Vec::new(),
            None => return Self::not_an_object(factory),
        };
        let r = self.alloc(HeapObject::Array(names));
        self.reference(r, factory)
    }

    fn get(
        &mut self,
        _: &ScriptContext,
        obj: &Value,
        key: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr {
        let Some(key) = Self::key_of(key) else {
            return factory.error("TypeError: bad key", ValueKind::ExecuteError);
        };
        let slot = match obj.engine_ref().and_then(|r| self.heap.get(&r)) {
            Some(HeapObject::Object(props)) => props.get(&key).cloned(),
            Some(HeapObject::Array(items)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
            }
            Some(_) => None,
            None => return Self::not_an_object(factory),
        };
        match slot {
            Some(slot) => self.to_value(&slot, factory),
            None => factory.error(format!("No such key: {}", key), ValueKind::KeyError),
        }
    }

    fn set(
        &mut self,
        _: &ScriptContext,
        obj: &Value,
        key: &Value,
        val: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr {
        let Some(key) = Self::key_of(key) else {
            return factory.error("TypeError: bad key", ValueKind::ExecuteError);
        };
        let slot = Self::to_slot(val);
        match obj.engine_ref().and_then(|r| self.heap.get_mut(&r)) {
            Some(HeapObject::Object(props)) => {
                props.insert(key, slot);
                factory.boolean(true)
            }
            Some(HeapObject::Array(items)) => match key.parse::<usize>() {
                Ok(i) if i < items.len() => {
                    items[i] = slot;
                    factory.boolean(true)
                }
                _ => factory.boolean(false),
            },
            _ => Self::not_an_object(factory),
        }
    }

    fn del(
        &mut self,
        _: &ScriptContext,
        obj: &Value,
        key: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr {
        let Some(key) = Self::key_of(key) else {
            return factory.error("TypeError: bad key", ValueKind::ExecuteError);
        };
        match obj.engine_ref().and_then(|r| self.heap.get_mut(&r)) {
            Some(HeapObject::Object(props)) => match props.remove(&key) {
                Some(_) => factory.boolean(true),
                None => factory.error(format!("No such key: {}", key), ValueKind::KeyError),
            },
            _ => Self::not_an_object(factory),
        }
    }

    fn splice(
        &mut self,
        _: &ScriptContext,
        obj: &Value,
        start: i32,
        delete_count: i32,
        new_val: Option<&Value>,
        factory: &ValueFactory,
    ) -> ValuePtr {
        let removed = match obj.engine_ref().and_then(|r| self.heap.get_mut(&r)) {
            Some(HeapObject::Array(items)) => {
                let len = items.len() as i64;
                let start = if start < 0 {
                    (len + start as i64).max(0) as usize
                } else {
                    (start as i64).min(len) as usize
                };
                let end = (start + delete_count.max(0) as usize).min(items.len());
                items.splice(start..end, new_val.map(Self::to_slot)).collect::<Vec<Slot>>()
            }
            _ => return Self::not_an_object(factory),
        };
        let r = self.alloc(HeapObject::Array(removed));
        self.reference(r, factory)
    }

    fn call(
        &mut self,
        _: &ScriptContext,
        func: &Value,
        _this: &Value,
        argv: &Value,
        factory: &ValueFactory,
        _interrupt: &Interrupt,
    ) -> ValuePtr {
        let args: Vec<Slot> = match argv.engine_ref().and_then(|r| self.heap.get(&r)) {
            Some(HeapObject::Array(items)) => items.clone(),
            _ => return factory.error("TypeError: argv is not an array", ValueKind::ExecuteError),
        };

        match func.engine_ref().and_then(|r| self.heap.get(&r)) {
            Some(HeapObject::Sum) => {
                let total = args.iter().map(|s| if let Slot::Int(i) = s { *i } else { 0 }).sum();
                factory.integer(total)
            }
            Some(HeapObject::Callback { callback_id, sink }) => {
                let (callback_id, sink) = (*callback_id, sink.clone());
                let arg = match args.first() {
                    Some(slot) => self.to_value(slot, factory),
                    None => factory.undefined(),
                };
                sink(callback_id, arg);
                factory.undefined()
            }
            _ => factory.error("TypeError: not a function", ValueKind::ExecuteError),
        }
    }
}

impl HeapReporter for ScriptEngine {
    fn heap_snapshot(
        &mut self,
        _: &ScriptContext,
        factory: &ValueFactory,
        _: &Interrupt,
    ) -> ValuePtr {
        factory.string(format!("{{\"nodes\":{}}}", self.heap.len()))
    }

    fn heap_stats(&mut self, _: &ScriptContext, factory: &ValueFactory, _: &Interrupt) -> ValuePtr {
        let arrays = self.heap.values().filter(|o| matches!(o, HeapObject::Array(_))).count();
        factory.string(format!(
            "{{\"objects\":{},\"arrays\":{}}}",
            self.heap.len() - arrays,
            arrays
        ))
    }
}

impl CallbackMaker for ScriptEngine {
    fn make_callback(
        &mut self,
        _: &ScriptContext,
        callback_id: u64,
        sink: CallbackSink,
        factory: &ValueFactory,
    ) -> ValuePtr {
        let r = self.alloc(HeapObject::Callback { callback_id, sink });
        self.reference(r, factory)
    }
}

/// A running session plus the channel its callback feeds
pub struct Harness {
    pub session: Session<ScriptEngine>,
    pub log: Arc<Mutex<EngineLog>>,
    pub results: Receiver<(u64, ValueHandle)>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(SessionOptions::default().with_worker_name("script-worker"))
    }

    pub fn start_with(options: SessionOptions) -> Self {
        let log = Arc::new(Mutex::new(EngineLog::default()));
        let (tx, rx) = channel::unbounded();

        let engine_log = log.clone();
        let session = Session::with_options(
            move || ScriptEngine::new(engine_log),
            move |callback_id, handle| {
                let _ = tx.send((callback_id, handle));
            },
            options,
        )
        .unwrap();

        Self {
            session,
            log,
            results: rx,
        }
    }

    /// Register a code string
    pub fn code(&self, code: &str) -> ValueHandle {
        self.session
            .alloc_value(ValueData::Text(code.to_string()), ValueKind::String)
            .unwrap()
    }

    /// Register a plain string
    pub fn text(&self, s: &str) -> ValueHandle {
        self.code(s)
    }

    /// Register an integer
    pub fn int(&self, i: i64) -> ValueHandle {
        self.session.alloc_value(ValueData::Integer(i), ValueKind::Integer).unwrap()
    }

    /// Evaluate `code` and wait for its result
    pub fn eval_wait(&self, code: &str, callback_id: u64) -> ValuePtr {
        let h = self.code(code);
        self.session.eval(h, callback_id).unwrap();
        let (id, result) = self.next_result();
        assert_eq!(id, callback_id);
        self.session.value(result).unwrap()
    }

    /// Evaluate `code` and return the result handle
    ///
    /// The code string is freed again, so only the result stays registered.
    pub fn eval_handle(&self, code: &str) -> ValueHandle {
        let h = self.code(code);
        self.session.eval(h, 0).unwrap();
        let (_, result) = self.next_result();
        self.session.free_value(h);
        result
    }

    /// Next `(callback_id, handle)` delivered to the session callback
    pub fn next_result(&self) -> (u64, ValueHandle) {
        self.results
            .recv_timeout(CALLBACK_TIMEOUT)
            .expect("callback did not fire")
    }

    /// Let the worker drain everything queued so far
    ///
    /// A trivial synchronous operation queues behind all earlier work. It
    /// only touches plain values, so it leaves no reference releases behind.
    pub fn sync(&self) {
        let n = self.int(0);
        let hash = self.session.get_identity_hash(n).unwrap();
        self.session.free_value(hash);
        self.session.free_value(n);
    }

    pub fn worker_thread(&self) -> ThreadId {
        self.log.lock().engine_thread.expect("engine not constructed")
    }
}
