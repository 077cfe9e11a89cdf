use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;

use querity::json::{parse_query_json, ParsedQuery};
use querity::mongo_compiler::MongoCompiler;
use querity::search_compiler::SearchCompiler;
use querity::sql_compiler::SqlCompiler;
use querity::{QueryCompiler, SchemaConfig};

const CONFIG_FILE: &str = "querity.json";
const PROMPT: &str = "querity> ";
const CONTINUATION: &str = "......   ";

/// 加载模式配置，失败时使用默认配置
fn load_schema() -> SchemaConfig {
    match SchemaConfig::from_json_file(CONFIG_FILE) {
        Ok(config) => {
            println!("✅ 使用JSON配置文件: {}", CONFIG_FILE);
            println!("✅ 加载了 {} 个表映射, {} 个关系", config.tables.len(), config.relations.len());
            for (entity, table) in &config.tables {
                println!("  {} -> {}", entity, table);
            }
            for (key, relation) in &config.relations {
                println!("  {} -> {} ({} = {})", key, relation.target, relation.join_column, relation.target_column);
            }
            config
        }
        Err(e) => {
            println!("⚠️ 无法加载JSON配置文件 ({}), 使用默认配置", e);
            SchemaConfig::default()
        }
    }
}

/// 用三个后端分别编译同一个查询
fn compile_all(schema: &SchemaConfig, entity: &str, parsed: &ParsedQuery) {
    let sql = SqlCompiler::new(schema.clone(), entity);
    let mongo = MongoCompiler::new(schema, entity);
    let search = SearchCompiler::new(schema, entity);

    println!("\n[SQL]:");
    let result = match parsed {
        ParsedQuery::Query(q) => sql.compile_query(q),
        ParsedQuery::Advanced(q) => sql.compile_advanced_query(q),
    };
    match result {
        Ok(result) => {
            println!("{}", result.sql);
            if result.requires_distinct {
                println!("⚠️ 分页查询经过一对多关系，结果可能包含重复行");
            }
        }
        Err(e) => println!("✗ SQL 编译失败: {}", e),
    }

    println!("\n[Mongo]:");
    let result = match parsed {
        ParsedQuery::Query(q) => mongo.compile_query(q),
        ParsedQuery::Advanced(q) => mongo.compile_advanced_query(q),
    };
    match result {
        Ok(query) => print_json(&query.to_json()),
        Err(e) => println!("✗ Mongo 编译失败: {}", e),
    }

    println!("\n[Search]:");
    let result = match parsed {
        ParsedQuery::Query(q) => search.compile_query(q),
        ParsedQuery::Advanced(q) => search.compile_advanced_query(q),
    };
    match result {
        Ok(request) => {
            println!("index: {}", request.index);
            print_json(&request.body);
        }
        Err(e) => println!("✗ Search 编译失败: {}", e),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => println!("✗ 无法输出JSON: {}", e),
    }
}

fn handle_input(schema: &SchemaConfig, entity: &str, input: &str) {
    match parse_query_json(input) {
        Ok(parsed) => {
            println!("✓ 成功解析查询");
            compile_all(schema, entity, &parsed);
        }
        Err(e) => println!("✗ 解析失败: {}", e),
    }
}

/// 括号未闭合时继续读取下一行
fn is_complete(buffer: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for c in buffer.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

fn print_help() {
    println!("输入一个JSON查询（可跨多行），例如:");
    println!(r#"  {{"filter": {{"propertyName": "lastName", "operator": "EQUALS", "value": "Skywalker"}}}}"#);
    println!("命令:");
    println!("  :entity <名称>  切换根实体");
    println!("  :help           显示帮助");
    println!("  :quit           退出");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("--- Querity: JSON 查询到 SQL / Mongo / Search 编译器 ---");
    println!("\n[配置信息]:");
    let schema = load_schema();
    let mut entity = String::from("Person");

    let demo = r#"{"filter": {"and": [
        {"propertyName": "lastName", "operator": "EQUALS", "value": "Skywalker"},
        {"not": {"propertyName": "height", "operator": "LESSER_THAN", "value": 150}}
    ]}, "sort": [{"propertyName": "firstName", "direction": "DESC"}], "pagination": {"page": 1, "pageSize": 20}}"#;
    println!("\n[示例查询]:\n{}", demo);
    handle_input(&schema, &entity, demo);

    println!();
    print_help();

    let config = Config::builder().auto_add_history(true).build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config).context("无法创建行编辑器")?;
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { PROMPT } else { CONTINUATION };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if buffer.is_empty() {
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some(command) = trimmed.strip_prefix(':') {
                        let mut words = command.split_whitespace();
                        match (words.next(), words.next()) {
                            (Some("quit" | "q"), _) => break,
                            (Some("help" | "h"), _) => print_help(),
                            (Some("entity"), Some(name)) => {
                                entity = name.to_string();
                                println!("✅ 根实体: {} (表 {})", entity, schema.table_name(&entity));
                            }
                            _ => println!("✗ 未知命令: {}", trimmed),
                        }
                        continue;
                    }
                }
                buffer.push_str(&line);
                buffer.push('\n');
                if is_complete(&buffer) {
                    handle_input(&schema, &entity, &buffer);
                    buffer.clear();
                }
            }
            Err(ReadlineError::Interrupted) => {
                if buffer.is_empty() {
                    println!("使用 :quit 或 Ctrl-D 退出");
                } else {
                    buffer.clear();
                    println!("^C");
                }
            }
            Err(ReadlineError::Eof) => {
                if !buffer.is_empty() {
                    handle_input(&schema, &entity, &buffer);
                }
                println!("\n再见!");
                break;
            }
            Err(err) => return Err(err).context("读取输入失败"),
        }
    }
    Ok(())
}
