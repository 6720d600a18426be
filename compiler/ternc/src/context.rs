//! The embedding context: registries, module set, VM, pipeline.

use crate::builtin::Builtins;
use rustc_hash::FxHashMap;
use tern_compile::{compile, ModuleHost, PassGroup};
use tern_diagnostic::Diagnostics;
use tern_ir::{FunctionId, ModuleId, StringInterner, TypeId};
use tern_module::Module;
use tern_types::{FunctionRegistry, TypeRegistry};
use tern_vm::{HostTable, RuntimeError, Vm, VmConfig, VmEnv};
use tracing::debug;

/// Context configuration. These switches do not affect language
/// semantics, only resource limits and logging.
#[derive(Clone, Debug)]
pub struct Config {
    pub stack_size: u64,
    pub log_instructions: bool,
    pub disable_optimizations: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stack_size: 8 * 1024 * 1024,
            log_instructions: false,
            disable_optimizations: false,
        }
    }
}

/// The loaded-module set; doubles as the compiler's import resolver.
#[derive(Default)]
pub struct ModuleSet {
    modules: Vec<Module>,
    by_name: FxHashMap<String, usize>,
    by_id: FxHashMap<ModuleId, usize>,
}

impl ModuleSet {
    fn insert(&mut self, module: Module) -> ModuleId {
        let id = module.id;
        let idx = self.modules.len();
        self.by_name.insert(module.name.clone(), idx);
        self.by_id.insert(id, idx);
        self.modules.push(module);
        id
    }

    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.by_id.get(&id).map(|&idx| &self.modules[idx])
    }

    pub fn by_name(&self, name: &str) -> Option<&Module> {
        self.by_name.get(name).map(|&idx| &self.modules[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }
}

impl ModuleHost for ModuleSet {
    fn find_module(&self, name: &str) -> Option<&Module> {
        self.by_name(name)
    }

    fn find_module_by_id(&self, id: ModuleId) -> Option<&Module> {
        self.get(id)
    }
}

/// Process-wide engine state and the text-to-execution pipeline.
pub struct Context {
    pub types: TypeRegistry,
    pub funcs: FunctionRegistry,
    pub interner: StringInterner,
    pub diags: Diagnostics,
    pub modules: ModuleSet,
    host: HostTable,
    vm: Vm,
    passes: PassGroup,
    builtins: Builtins,
    config: Config,
}

impl Context {
    pub fn new(config: Config) -> Context {
        let mut types = TypeRegistry::new();
        let mut funcs = FunctionRegistry::new();
        let mut host = HostTable::new();
        let interner = StringInterner::new();
        let builtins = Builtins::register(&mut types, &mut funcs, &mut host, &interner);

        Context {
            types,
            funcs,
            interner,
            diags: Diagnostics::new(),
            modules: ModuleSet::default(),
            host,
            vm: Vm::new(VmConfig {
                stack_size: config.stack_size,
                log_instructions: config.log_instructions,
            }),
            passes: PassGroup::new(),
            builtins,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Install an optimization pass (ignored entirely when
    /// `disable_optimizations` is set).
    pub fn add_pass(&mut self, pass: Box<dyn tern_compile::IrPass>) {
        self.passes.add(pass);
    }

    /// Compile one source unit into a loaded module. Returns the module
    /// id even when diagnostics were raised; `Err` only when errors make
    /// the module unrunnable (its `__init__` is then not executed).
    pub fn compile_module(
        &mut self,
        name: &str,
        path: &str,
        source: &str,
    ) -> Result<ModuleId, ModuleId> {
        debug!(module = name, "pipeline start");
        let lexed = tern_lexer::lex(source, &self.interner);
        self.diags.extend(lexed.diagnostics);
        let tree = tern_parse::parse(&lexed.tokens, &self.interner);

        let errors_before = self.diags.error_count();
        let module = compile(
            tree,
            name,
            path,
            source,
            &mut self.types,
            &mut self.funcs,
            &self.interner,
            &mut self.diags,
            &self.modules,
        );
        let failed = self.diags.error_count() > errors_before;

        if !self.config.disable_optimizations && !self.passes.is_empty() {
            for &fn_id in &module.functions {
                if let Some(function) = self.funcs.get_mut(fn_id) {
                    if let Some(code) = function.code.as_mut() {
                        self.passes.run(code);
                    }
                }
            }
        }

        let init = module.init;
        let id = self.modules.insert(module);
        self.vm.load_module(self.modules.get(id).expect("just inserted"));

        if failed {
            return Err(id);
        }
        // Module initialization populates the globals.
        if let Err(err) = self.execute(init, &[]) {
            self.diags.push(tern_diagnostic::Diagnostic::error(
                err.code(),
                format!("module `{name}` initialization failed: {err}"),
                tern_ir::Span::DUMMY,
            ));
            return Err(id);
        }
        Ok(id)
    }

    /// Load a previously serialized module artifact.
    pub fn load_artifact(&mut self, bytes: &[u8]) -> Result<ModuleId, tern_module::DecodeError> {
        let module = tern_module::decode_module(
            bytes,
            &mut self.types,
            &mut self.funcs,
            &self.interner,
        )?;
        let init = module.init;
        let id = self.modules.insert(module);
        self.vm.load_module(self.modules.get(id).expect("just inserted"));
        if let Err(err) = self.execute(init, &[]) {
            self.diags.push(tern_diagnostic::Diagnostic::error(
                err.code(),
                format!("module initialization failed: {err}"),
                tern_ir::Span::DUMMY,
            ));
        }
        Ok(id)
    }

    /// Serialize a loaded module to its binary artifact.
    pub fn save_artifact(&self, id: ModuleId) -> Option<Vec<u8>> {
        let module = self.modules.get(id)?;
        Some(tern_module::encode_module(
            module,
            &self.types,
            &self.funcs,
            &self.interner,
        ))
    }

    /// Resolve a loaded module by name (embedding API).
    pub fn resolve_module(&self, name: &str) -> Option<&Module> {
        self.modules.by_name(name)
    }

    /// Find a function by module and bare name (first overload).
    pub fn function(&self, module: &str, name: &str) -> Option<FunctionId> {
        let module = self.modules.by_name(module)?;
        module
            .functions
            .iter()
            .copied()
            .find(|&id| self.funcs.get(id).map(|f| f.name == name).unwrap_or(false))
    }

    /// Execute a function with explicit argument values; the implicit
    /// prefix (closure, return, context pointers) is supplied
    /// automatically. Returns the primitive result register.
    pub fn execute(&mut self, function: FunctionId, args: &[u64]) -> Result<u64, RuntimeError> {
        self.execute_with_ret(function, 0, args)
    }

    /// Execute with a caller-provided return pointer for non-primitive
    /// results.
    pub fn execute_with_ret(
        &mut self,
        function: FunctionId,
        ret_ptr: u64,
        args: &[u64],
    ) -> Result<u64, RuntimeError> {
        let implicit = self
            .funcs
            .get(function)
            .and_then(|f| f.signature)
            .and_then(|s| self.types.get(s))
            .and_then(|t| t.signature())
            .map(|sig| sig.implicit_arity())
            .unwrap_or(3);
        let mut full = Vec::with_capacity(implicit + args.len());
        full.push(0); // func_ptr
        full.push(ret_ptr); // ret_ptr
        full.push(0); // context_ptr
        for _ in 3..implicit {
            full.push(0); // this_ptr when calling a method directly
        }
        full.extend_from_slice(args);

        let mut env = VmEnv {
            types: &self.types,
            funcs: &self.funcs,
            host: &mut self.host,
        };
        self.vm.execute(&mut env, function, &full)
    }

    /// Whether the VM is inside an `execute` nest.
    pub fn is_executing(&self) -> bool {
        self.vm.is_executing()
    }

    /// Scratch allocation in VM memory (for host-provided return
    /// storage and test fixtures).
    pub fn host_alloc(&mut self, size: u64) -> u64 {
        self.vm.memory.host_alloc(size)
    }

    /// Read raw bytes out of VM memory.
    pub fn read_memory(&self, address: u64, len: u64) -> Result<Vec<u8>, RuntimeError> {
        self.vm.memory.slice(address, len).map(<[u8]>::to_vec)
    }

    /// The builtin `string` class type.
    pub fn string_type(&self) -> TypeId {
        self.builtins.string_ty
    }

    /// Instantiate (or fetch the cached) `Array<element>` type.
    pub fn get_array_type(&mut self, element: TypeId) -> TypeId {
        Builtins::array_type(
            &mut self.types,
            &mut self.funcs,
            &mut self.host,
            &self.interner,
            element,
        )
    }

    /// Instantiate (or fetch the cached) `Pointer<element>` type.
    pub fn get_pointer_type(&mut self, element: TypeId) -> TypeId {
        Builtins::pointer_type(&mut self.types, &self.interner, element)
    }
}
