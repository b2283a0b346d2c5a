//! ContaHub point-of-sale exports
//!
//! ContaHub wraps every query result in `{"list": [...]}`. Monetary columns
//! arrive under `$`-prefixed keys; timestamps carry a `-0300` style offset.

use super::{FieldKind, FieldSpec, SchemaDescriptor};
use crate::keys::KeyStrategy;

const CONTAINER: &str = "list";

pub fn descriptors() -> Vec<SchemaDescriptor> {
    vec![
        analitico(),
        fatporhora(),
        pagamentos(),
        periodo(),
        prodporhora(),
        tempo(),
    ]
}

/// Sold items, one row per sale line
pub fn analitico() -> SchemaDescriptor {
    SchemaDescriptor::new("analitico", "contahub_analitico", CONTAINER, 500)
        .fields(vec![
            FieldSpec::text("vd_mesadesc"),
            FieldSpec::text("vd_localizacao"),
            FieldSpec::integer("itm"),
            FieldSpec::integer("trn"),
            FieldSpec::text("trn_desc"),
            FieldSpec::text("prefixo"),
            FieldSpec::text("tipo"),
            FieldSpec::text("tipovenda"),
            FieldSpec::integer("ano"),
            FieldSpec::new("mes", FieldKind::MonthOfYearMonth),
            FieldSpec::date("trn_dtgerencial"),
            FieldSpec::text("usr_lancou"),
            FieldSpec::text("prd"),
            FieldSpec::text("prd_desc"),
            FieldSpec::text("grp_desc"),
            FieldSpec::text("loc_desc"),
            FieldSpec::float("qtd"),
            FieldSpec::float("desconto"),
            FieldSpec::float("valorfinal"),
            FieldSpec::float("custo"),
            FieldSpec::text("itm_obs"),
            FieldSpec::text("comandaorigem"),
            FieldSpec::text("itemorigem"),
        ])
        .key(KeyStrategy::natural(&["trn", "itm", "trn_dtgerencial"]))
}

/// Revenue by hour of the business day
pub fn fatporhora() -> SchemaDescriptor {
    SchemaDescriptor::new("fatporhora", "contahub_fatporhora", CONTAINER, 500)
        .fields(vec![
            FieldSpec::date("vd_dtgerencial"),
            FieldSpec::integer("dds"),
            FieldSpec::text("dia"),
            FieldSpec::new("hora", FieldKind::Hour),
            FieldSpec::float("qtd"),
            FieldSpec::float("valor").at(&["$valor"]),
        ])
        .key(KeyStrategy::natural(&["vd_dtgerencial", "hora"]))
}

/// Payments; ContaHub exposes no stable payment id, so the key hashes the
/// identifying columns and numbers repeats within a capture
pub fn pagamentos() -> SchemaDescriptor {
    SchemaDescriptor::new("pagamentos", "contahub_pagamentos", CONTAINER, 500)
        .fields(vec![
            FieldSpec::text("vd").at(&["vd", "id"]),
            FieldSpec::text("trn").at(&["trn", "id"]),
            FieldSpec::date("dt_gerencial"),
            FieldSpec::text("hr_lancamento"),
            FieldSpec::text("hr_transacao"),
            FieldSpec::date("dt_transacao"),
            FieldSpec::text("mesa"),
            FieldSpec::integer("cli"),
            FieldSpec::text("cliente").at(&["cliente", "descricao"]),
            FieldSpec::float("vr_pagamentos").at(&["$vr_pagamentos", "valor"]),
            FieldSpec::text("pag"),
            FieldSpec::float("valor").at(&["$valor", "valor"]),
            FieldSpec::float("taxa").at(&["$taxa"]),
            FieldSpec::float("perc").at(&["$perc"]),
            FieldSpec::float("liquido").at(&["$liquido", "valor"]),
            FieldSpec::text("tipo"),
            FieldSpec::text("meio").at(&["meio", "tipo"]),
            FieldSpec::text("cartao"),
            FieldSpec::text("autorizacao"),
            FieldSpec::date("dt_credito"),
            FieldSpec::text("usr_abriu"),
            FieldSpec::text("usr_lancou"),
            FieldSpec::text("usr_aceitou"),
            FieldSpec::text("motivodesconto"),
        ])
        .key(
            KeyStrategy::content_hash(&[
                "dt_gerencial",
                "vd",
                "trn",
                "pag",
                "hr_lancamento",
                "autorizacao",
            ])
            .with_occurrence(),
        )
}

/// Table sessions (one row per opened tab)
pub fn periodo() -> SchemaDescriptor {
    SchemaDescriptor::new("periodo", "contahub_periodo", CONTAINER, 500)
        .fields(vec![
            FieldSpec::date("dt_gerencial"),
            FieldSpec::text("tipovenda"),
            FieldSpec::text("vd_mesadesc"),
            FieldSpec::text("vd_localizacao"),
            FieldSpec::text("cht_nome"),
            FieldSpec::text("cli_nome"),
            FieldSpec::date("cli_dtnasc"),
            FieldSpec::text("cli_email"),
            FieldSpec::text("cli_fone"),
            FieldSpec::text("usr_abriu"),
            FieldSpec::integer("pessoas"),
            FieldSpec::integer("qtd_itens"),
            FieldSpec::float("vr_pagamentos").at(&["$vr_pagamentos"]),
            FieldSpec::float("vr_produtos").at(&["$vr_produtos"]),
            FieldSpec::float("vr_repique").at(&["$vr_repique"]),
            FieldSpec::float("vr_couvert").at(&["$vr_couvert"]),
            FieldSpec::float("vr_desconto").at(&["$vr_desconto"]),
            FieldSpec::text("motivo"),
            FieldSpec::date("dt_contabil"),
            FieldSpec::text("ultimo_pedido"),
            FieldSpec::date("vd_dtcontabil"),
            FieldSpec::week_of("semana", "dt_gerencial"),
        ])
        .key(
            KeyStrategy::content_hash(&[
                "dt_gerencial",
                "vd_mesadesc",
                "vd_localizacao",
                "cht_nome",
                "cli_nome",
                "usr_abriu",
                "ultimo_pedido",
            ])
            .with_occurrence(),
        )
}

/// Products sold by hour of the business day
pub fn prodporhora() -> SchemaDescriptor {
    SchemaDescriptor::new("prodporhora", "contahub_prodporhora", CONTAINER, 500)
        .fields(vec![
            FieldSpec::date("data_gerencial"),
            FieldSpec::new("hora", FieldKind::Hour),
            FieldSpec::text("produto_id").at(&["produto_id", "prd"]),
            FieldSpec::text("produto_descricao").at(&["produto_descricao", "prd_desc"]),
            FieldSpec::text("grupo_descricao").at(&["grupo_descricao", "grp_desc"]),
            FieldSpec::float("quantidade").at(&["quantidade", "qtd"]),
            FieldSpec::float("valor_unitario").at(&["valor_unitario", "valor_unit"]),
            FieldSpec::float("valor_total").at(&["valor_total", "valor"]),
        ])
        .key(KeyStrategy::natural(&["data_gerencial", "hora", "produto_id"]))
}

/// Kitchen and bar production times per item
pub fn tempo() -> SchemaDescriptor {
    SchemaDescriptor::new("tempo", "contahub_tempo", CONTAINER, 200)
        .fields(vec![
            FieldSpec::date("data").at(&["dia"]),
            FieldSpec::text("grp_desc"),
            FieldSpec::text("prd_desc"),
            FieldSpec::text("vd_mesadesc"),
            FieldSpec::text("vd_localizacao"),
            FieldSpec::text("itm"),
            FieldSpec::timestamp("t0_lancamento").at(&["t0-lancamento"]),
            FieldSpec::timestamp("t1_prodini").at(&["t1-prodini"]),
            FieldSpec::timestamp("t2_prodfim").at(&["t2-prodfim"]),
            FieldSpec::timestamp("t3_entrega").at(&["t3-entrega"]),
            FieldSpec::integer("t0_t1").at(&["t0-t1"]),
            FieldSpec::integer("t0_t2").at(&["t0-t2"]),
            FieldSpec::integer("t0_t3").at(&["t0-t3"]),
            FieldSpec::integer("t1_t2").at(&["t1-t2"]),
            FieldSpec::integer("t1_t3").at(&["t1-t3"]),
            FieldSpec::integer("t2_t3").at(&["t2-t3"]),
            FieldSpec::integer("prd"),
            FieldSpec::text("prd_idexterno").at(&["prd"]),
            FieldSpec::text("loc_desc"),
            FieldSpec::text("usr_abriu"),
            FieldSpec::text("usr_lancou"),
            FieldSpec::text("usr_produziu"),
            FieldSpec::text("usr_entregou"),
            FieldSpec::text("usr_transfcancelou"),
            FieldSpec::text("prefixo"),
            FieldSpec::text("tipovenda"),
            FieldSpec::integer("ano"),
            FieldSpec::new("mes", FieldKind::MonthOfYearMonth),
            FieldSpec::date("dia"),
            FieldSpec::integer("dds"),
            FieldSpec::text("diadasemana"),
            FieldSpec::text("hora"),
            FieldSpec::integer("itm_qtd"),
        ])
        .key(
            KeyStrategy::content_hash(&["data", "itm", "prd", "vd_mesadesc", "t0_lancamento"])
                .with_occurrence(),
        )
}
