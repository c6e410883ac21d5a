use std::collections::HashMap;

use gebom_core::material::ShaftId;

use crate::session::{MaterialQuery, Session};

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// 查找 `key=value` 形式的参数。
    fn arg(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| {
            arg.split_once('=')
                .filter(|(k, _)| k.trim().eq_ignore_ascii_case(key))
                .map(|(_, v)| v.trim())
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
    pub lines: Vec<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            lines: Vec::new(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            lines: Vec::new(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut Session,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(ClearResultsCommand);
        bus.register(ListShaftsCommand);
        bus.register(MaterialsCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct ClearResultsCommand;

impl CommandHandler for ClearResultsCommand {
    fn name(&self) -> &'static str {
        "clear_results"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if context.session.clear() {
            CommandResponse::ok("运行结果已清空")
        } else {
            CommandResponse::ok("当前没有运行结果")
        }
    }
}

struct ListShaftsCommand;

impl CommandHandler for ListShaftsCommand {
    fn name(&self) -> &'static str {
        "list_shafts"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.shafts() {
            Ok(shafts) => CommandResponse::ok(format!("共 {} 个竖井", shafts.len()))
                .with_lines(shafts.iter().map(ToString::to_string).collect()),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

/// 参数：`shaft=SH-NN`（可选）、`limit=N`（可选，默认 100）。
struct MaterialsCommand;

impl CommandHandler for MaterialsCommand {
    fn name(&self) -> &'static str {
        "materials"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let mut query = MaterialQuery::default();
        if let Some(shaft) = request.arg("shaft").filter(|s| !s.is_empty()) {
            query.shaft = Some(ShaftId::new(shaft));
        }
        if let Some(raw) = request.arg("limit") {
            match raw.parse::<usize>() {
                Ok(limit) => query.limit = limit,
                Err(_) => return CommandResponse::err(format!("无效的 limit 参数: {raw}")),
            }
        }

        match context.session.materials(&query) {
            Ok(items) => {
                let lines = items
                    .iter()
                    .map(|item| {
                        format!(
                            "{:<8} {:<14} {:>12} {:<2} {}",
                            item.shaft_id.as_ref().map(ShaftId::as_str).unwrap_or("-"),
                            item.article_no,
                            item.quantity.to_string(),
                            item.unit.as_str(),
                            item.description
                        )
                    })
                    .collect();
                CommandResponse::ok(format!("共 {} 条物料", items.len())).with_lines(lines)
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}
