//! Nibo accounting API
//!
//! Nibo pages return `{"items": [...]}` with camelCase keys and nested
//! reference objects (`category`, `stakeholder`, `bankAccount`, ...).
//! Every entity has a stable id, so keys are natural.

use super::{FieldSpec, SchemaDescriptor};
use crate::keys::KeyStrategy;

const CONTAINER: &str = "items";
const BATCH_SIZE: usize = 1000;

pub fn descriptors() -> Vec<SchemaDescriptor> {
    vec![agendamentos(), stakeholders(), categorias()]
}

/// Scheduled receivables and payables
pub fn agendamentos() -> SchemaDescriptor {
    SchemaDescriptor::new("agendamentos", "nibo_agendamentos", CONTAINER, BATCH_SIZE)
        .fields(vec![
            FieldSpec::text("nibo_id").at(&["scheduleId", "id"]),
            FieldSpec::text("tipo").at(&["type"]).or("receita"),
            FieldSpec::text("status").at(&["status"]).or("pendente"),
            FieldSpec::float("valor").at(&["value"]),
            FieldSpec::float("valor_pago").at(&["paidValue"]),
            FieldSpec::date("data_vencimento").at(&["dueDate"]),
            FieldSpec::date("data_pagamento").at(&["paymentDate"]),
            FieldSpec::date("data_competencia").at(&["accrualDate"]),
            FieldSpec::text("descricao").at(&["description"]),
            FieldSpec::text("observacoes").at(&["notes"]),
            FieldSpec::text("categoria_id").at(&["category.id"]),
            FieldSpec::text("categoria_nome").at(&["category.name"]),
            FieldSpec::text("stakeholder_id").at(&["stakeholder.id"]),
            FieldSpec::text("stakeholder_nome").at(&["stakeholder.name"]),
            FieldSpec::text("stakeholder_tipo").at(&["stakeholder.type"]),
            FieldSpec::text("conta_bancaria_id").at(&["bankAccount.id"]),
            FieldSpec::text("conta_bancaria_nome").at(&["bankAccount.name"]),
            FieldSpec::text("centro_custo_id").at(&["costCenter.id"]),
            FieldSpec::text("centro_custo_nome").at(&["costCenter.name"]),
            FieldSpec::text("numero_documento").at(&["documentNumber"]),
            FieldSpec::integer("numero_parcela").at(&["installmentNumber"]),
            FieldSpec::integer("total_parcelas").at(&["totalInstallments"]),
            FieldSpec::boolean("recorrente").at(&["recurring"]),
            FieldSpec::text("frequencia_recorrencia").at(&["recurrenceFrequency"]),
            FieldSpec::timestamp("data_atualizacao").at(&["updateDate"]),
            FieldSpec::text("usuario_atualizacao").at(&["updateUser"]),
            FieldSpec::text("titulo").at(&["title"]),
            FieldSpec::json("anexos").at(&["attachments"]),
            FieldSpec::json("tags").at(&["tags"]),
            FieldSpec::json("recorrencia_config").at(&["recurrenceConfig"]),
            FieldSpec::boolean("deletado").at(&["deleted"]),
        ])
        .key(KeyStrategy::natural(&["nibo_id"]))
}

pub fn stakeholders() -> SchemaDescriptor {
    SchemaDescriptor::new("stakeholders", "nibo_stakeholders", CONTAINER, BATCH_SIZE)
        .fields(vec![
            FieldSpec::text("nibo_id").at(&["id"]),
            FieldSpec::text("nome").at(&["name"]),
            FieldSpec::text("email"),
            FieldSpec::text("telefone").at(&["phone"]),
            FieldSpec::text("tipo").at(&["type"]),
            FieldSpec::boolean("ativo").at(&["active"]),
        ])
        .key(KeyStrategy::natural(&["nibo_id"]))
}

pub fn categorias() -> SchemaDescriptor {
    SchemaDescriptor::new("categorias", "nibo_categorias", CONTAINER, BATCH_SIZE)
        .fields(vec![
            FieldSpec::text("nibo_id").at(&["id"]),
            FieldSpec::text("nome").at(&["name"]),
            FieldSpec::text("tipo").at(&["type"]),
            FieldSpec::boolean("ativo").at(&["active"]),
        ])
        .key(KeyStrategy::natural(&["nibo_id"]))
}
