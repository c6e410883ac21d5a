use anyhow::{Result, bail};
use gebom_core::material::LineItem;
use gebom_engine::command::{CommandBus, CommandContext, CommandRequest};
use gebom_engine::pipeline::RunReport;
use tracing::info;

/// 打印运行概览：按竖井列出清单行、未分配行、目录未收录组合与诊断计数。
pub fn print_summary(report: &RunReport, limit: usize) {
    let bom = &report.bom;
    let diagnostics = &report.diagnostics;
    info!(
        shafts = bom.by_shaft.len(),
        unassigned = bom.unassigned.len(),
        unresolved = bom.unresolved.len(),
        "输出物料清单概览"
    );

    println!("GEBOM 物料清单（敷设方式: {}）", bom.pipe_type);

    for (shaft, items) in &bom.by_shaft {
        println!("竖井 {shaft}:");
        print_items(items, limit);
    }
    if !bom.unassigned.is_empty() {
        println!("未分配竖井:");
        print_items(&bom.unassigned, limit);
    }

    println!("货号合计:");
    for (article_no, quantity) in &bom.totals_by_article {
        println!("  {article_no:<14} {:>12} {}", quantity.to_string(), quantity.unit().as_str());
    }

    if !bom.unresolved.is_empty() {
        println!("目录未收录:");
        for miss in &bom.unresolved {
            println!("  {} ×{}", miss.key(), miss.occurrences);
        }
    }

    println!(
        "诊断: 记录={}, 命名不符={}, 未识别类型={}, 数据不完整={}, \
         无法确定类别={}, 未识别块={}, 目录缺失={}",
        diagnostics.total_records,
        diagnostics.outside_convention,
        diagnostics.unrecognized_kind,
        diagnostics.malformed,
        diagnostics.unrecognized_category,
        diagnostics.unclassified_blocks,
        diagnostics.catalog_misses,
    );
    println!(
        "几何检查: 管径不符={}, 未连接管件={}, 交叉管段={}, 45°转角管段={}",
        diagnostics.diameter_mismatches,
        diagnostics.unconnected_fittings,
        diagnostics.crossing_runs,
        diagnostics.angled_runs,
    );
    if let Some(extents) = report.extents {
        println!(
            "图元范围: ({:.2}, {:.2}) - ({:.2}, {:.2})",
            extents.min().x,
            extents.min().y,
            extents.max().x,
            extents.max().y
        );
    }
}

fn print_items(items: &[LineItem], limit: usize) {
    for item in items.iter().take(limit) {
        println!(
            "  {:<14} {:>12} {:<2} [{}] {}",
            item.article_no,
            item.quantity.to_string(),
            item.unit.as_str(),
            item.category.label(),
            item.description
        );
    }
    if items.len() > limit {
        println!("  ……另有 {} 行未显示", items.len() - limit);
    }
}

/// 通过命令总线执行查询并打印结果。
pub fn print_command(
    bus: &CommandBus,
    request: &CommandRequest,
    context: &mut CommandContext<'_>,
) -> Result<()> {
    let response = bus.dispatch(request, context);
    if !response.success {
        bail!(
            "命令 {} 执行失败: {}",
            request.name,
            response.message.unwrap_or_default()
        );
    }
    if let Some(message) = response.message {
        println!("[命令] {message}");
    }
    for line in response.lines {
        println!("  {line}");
    }
    Ok(())
}
